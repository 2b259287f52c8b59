use std::panic;

use log::{error, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Config;

const PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%S%.3f)} {h({l:<5})} {t} - {m}{n}";

/// Routes the `log` facade to stdout and logs panics instead of letting
/// them go to stderr unformatted.
pub fn init(level: LevelFilter) -> anyhow::Result<()> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))?;
    log4rs::init_config(config)?;

    panic::set_hook(Box::new(|panic_info| {
        error!("{}", panic_info);
        let backtrace = std::backtrace::Backtrace::capture();
        error!("backtrace: {:#?}", backtrace);
    }));
    Ok(())
}
