use log::LevelFilter;

pub struct Logger;

impl Logger {
    pub fn init(level: LevelFilter) {
        let mut builder: env_logger::Builder = colog::default_builder();
        builder.filter_level(level);

        // request-level chatter from the HTTP and WebDriver clients
        for noisy in ["hyper", "hyper_util", "reqwest", "fantoccini", "rustls"] {
            builder.filter_module(noisy, level.min(LevelFilter::Warn));
        }

        builder.init();
    }
}
