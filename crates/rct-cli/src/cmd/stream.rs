use crate::output::print_json;
use rct_core::clock::SystemClock;
use rct_core::config::Config;
use rct_core::control::ObsWebSocket;
use rct_core::sequencer::Sequencer;

pub fn start(config: &Config, json: bool) -> anyhow::Result<()> {
    let clock = SystemClock;
    let notifier = super::notifier(config);
    let mut sequencer = Sequencer::new(ObsWebSocket::new(), config, &clock, &notifier);
    let live = sequencer.go_live(|| super::youtube(config, &clock, &notifier))?;

    if json {
        print_json(&live)?;
    } else {
        println!(
            "Live: {} ({}){}",
            live.broadcast.title,
            live.broadcast.id,
            if live.reused { " [reused]" } else { "" }
        );
    }
    Ok(())
}

pub fn stop(config: &Config, json: bool) -> anyhow::Result<()> {
    let clock = SystemClock;
    let notifier = super::notifier(config);
    let mut sequencer = Sequencer::new(ObsWebSocket::new(), config, &clock, &notifier);
    let outcome = sequencer.go_dark(|| super::youtube(config, &clock, &notifier))?;

    if json {
        print_json(&outcome)?;
    } else {
        for id in &outcome.deleted {
            println!("Deleted leftover broadcast {id}");
        }
        let verb = if outcome.created { "Scheduled" } else { "Already scheduled" };
        println!("{verb}: {} ({})", outcome.tomorrow.title, outcome.tomorrow.id);
    }
    Ok(())
}
