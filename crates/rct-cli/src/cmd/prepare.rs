use rct_core::clock::SystemClock;
use rct_core::config::Config;
use rct_core::host::SystemHost;
use rct_core::prepare::Preparator;

pub fn run(config: &Config) -> anyhow::Result<()> {
    let notifier = super::notifier(config);
    Preparator::new(config, &SystemHost, &SystemClock, &notifier).ensure_ready()?;
    Ok(())
}
