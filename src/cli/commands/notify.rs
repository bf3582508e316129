use clap::{Arg, ArgMatches, Command};

pub const ARG_NOTIFY_QUEUE_SIZE: &str = "notify-queue-size";
pub const ARG_NOTIFY_MAX_ATTEMPTS: &str = "notify-max-attempts";
pub const ARG_NOTIFY_BACKOFF_BASE_SECONDS: &str = "notify-backoff-base-seconds";
pub const ARG_NOTIFY_BACKOFF_MAX_SECONDS: &str = "notify-backoff-max-seconds";

#[derive(Debug)]
pub struct Options {
    pub queue_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

impl Options {
    /// Parse notification worker arguments from matches.
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            queue_size: matches
                .get_one::<usize>(ARG_NOTIFY_QUEUE_SIZE)
                .copied()
                .unwrap_or(1024),
            max_attempts: matches
                .get_one::<u32>(ARG_NOTIFY_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(5),
            backoff_base_seconds: matches
                .get_one::<u64>(ARG_NOTIFY_BACKOFF_BASE_SECONDS)
                .copied()
                .unwrap_or(1),
            backoff_max_seconds: matches
                .get_one::<u64>(ARG_NOTIFY_BACKOFF_MAX_SECONDS)
                .copied()
                .unwrap_or(60),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_NOTIFY_QUEUE_SIZE)
                .long(ARG_NOTIFY_QUEUE_SIZE)
                .help("Sign-in notifications buffered before new ones are dropped")
                .env("TESSERA_NOTIFY_QUEUE_SIZE")
                .default_value("1024")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_NOTIFY_MAX_ATTEMPTS)
                .long(ARG_NOTIFY_MAX_ATTEMPTS)
                .help("Max delivery attempts per notification")
                .env("TESSERA_NOTIFY_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_NOTIFY_BACKOFF_BASE_SECONDS)
                .long(ARG_NOTIFY_BACKOFF_BASE_SECONDS)
                .help("Base delay for notification retry backoff")
                .env("TESSERA_NOTIFY_BACKOFF_BASE_SECONDS")
                .default_value("1")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_NOTIFY_BACKOFF_MAX_SECONDS)
                .long(ARG_NOTIFY_BACKOFF_MAX_SECONDS)
                .help("Max delay for notification retry backoff")
                .env("TESSERA_NOTIFY_BACKOFF_MAX_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
}
