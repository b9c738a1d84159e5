use crate::output::{print_json, yes_no};
use rct_core::clock::SystemClock;
use rct_core::config::Config;
use rct_core::control::{ControlClient, ObsWebSocket};

pub fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    let clock = SystemClock;
    let mut client = ControlClient::new(ObsWebSocket::new(), &config.control, &clock);
    let status = client.status();

    if json {
        print_json(&status)?;
    } else {
        println!("Endpoint:     {}", client.endpoint().display());
        println!("Connected:    {}", yes_no(status.reachable));
        println!(
            "Streaming:    {}",
            if status.transmitting { "LIVE" } else { "idle" }
        );
        println!("Scene:        {}", status.current_scene);
    }
    Ok(())
}
