mod cli;
mod logger;

use std::env;
use std::io::{self, Write};

use log::{error, info};
use logger::FileLogger;
use malooer::{
    Clock, ConfigError, Probe, ProbeConfig, Scheduler, SmtpTransport, SystemClock, Transport,
};

fn report(error: &ConfigError) {
    match error {
        ConfigError::MissingField(name) => eprintln!("{}: missing option -{}", cli::APP_NAME, name),
        other => eprintln!("{}: {}", cli::APP_NAME, other),
    }
    cli::print_help();
}

/// Hands the probe to the scheduler. A transport that could not be built is
/// terminal: `No such provider` goes to `out` and nothing is probed.
fn launch<T, W, C>(config: &ProbeConfig, transport: malooer::Result<T>, mut out: W, clock: C)
where
    T: Transport,
    W: Write,
    C: Clock,
{
    let transport = match transport {
        Ok(transport) => transport,
        Err(e) => {
            error!("{}", e);
            let _ = writeln!(out, "No such provider");
            return;
        }
    };

    info!(
        "probing {}:{} as {} ({})",
        config.host(),
        config.port(),
        config.user(),
        if config.run_once() {
            "once".to_string()
        } else {
            format!("every {}s", config.interval().as_secs())
        }
    );

    let mut probe = Probe::with_sink(config, transport, out);
    let mut scheduler = Scheduler::new(clock);
    if let Err(e) = scheduler.run(&mut probe, config.run_once(), config.interval()) {
        error!("{}", e);
    }
}

/*
    Required parameters: -port -host -user -pwd
    Optional: -i <INTERVAL> -o -config <FILE> -log <FILE> -timeout <SECONDS> -starttls

    Every startup problem prints the help and returns; once the scheduler
    starts, probe failures are only ever reported as result lines.
*/
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        cli::print_help();
        return;
    }

    let (config, transport_config, logfile) = match cli::parse(args).and_then(cli::resolve) {
        Ok(resolved) => resolved,
        Err(e) => {
            report(&e);
            return;
        }
    };

    let logger = match FileLogger::new(logfile.as_deref()) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("{}: cannot open log file: {}", cli::APP_NAME, e);
            return;
        }
    };

    let transport = SmtpTransport::new(transport_config, logger);
    launch(&config, transport, io::stdout(), SystemClock::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use malooer::{Error, RawConfig, TransportError};

    #[derive(Default)]
    struct Counting {
        connects: usize,
    }

    impl Transport for &mut Counting {
        fn connect(&mut self, _: &str, _: u16, _: &str, _: &str) -> Result<(), TransportError> {
            self.connects += 1;
            Ok(())
        }
        fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn once() -> ProbeConfig {
        ProbeConfig::resolve(&RawConfig {
            host: Some("mail.example.com".to_string()),
            port: Some("25".to_string()),
            user: Some("probe".to_string()),
            password: Some("secret".to_string()),
            once: true,
            ..RawConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn unavailable_provider_runs_nothing() {
        let mut out = Vec::new();
        let transport: malooer::Result<&mut Counting> =
            Err(Error::ProviderUnavailable("no trust anchors".to_string()));
        launch(&once(), transport, &mut out, SystemClock::new());
        assert_eq!(String::from_utf8(out).unwrap(), "No such provider\n");
    }

    #[test]
    fn available_provider_probes() {
        let mut out = Vec::new();
        let mut counting = Counting::default();
        launch(&once(), Ok(&mut counting), &mut out, SystemClock::new());
        assert_eq!(counting.connects, 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with(": [OK] Connection established - mail.example.com\n"));
    }
}
