use clap::{Arg, ArgAction, ArgMatches, Command};
use malooer::{Config, ConfigError, ProbeConfig, ProbeFile, RawConfig};

pub(crate) const APP_NAME: &str = "malooer";

/// Multi-letter options that may be written with a single dash.
const LONG_FLAGS: [&str; 8] = [
    "port", "host", "user", "pwd", "config", "log", "timeout", "starttls",
];

fn value_arg(name: &'static str, value_name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name(value_name)
        .num_args(1)
        .allow_hyphen_values(true)
        .help(help)
}

pub(crate) fn command() -> Command {
    Command::new(APP_NAME)
        .about("Periodically checks that an SMTP server is reachable and accepts a login")
        .arg(value_arg("port", "PORT_NUMBER", "port of server"))
        .arg(value_arg("host", "HOST", "the host"))
        .arg(value_arg("user", "USER", "the user"))
        .arg(value_arg("pwd", "PASSWORD", "the password"))
        .arg(
            Arg::new("i")
                .short('i')
                .value_name("INTERVAL")
                .num_args(1)
                .allow_hyphen_values(true)
                .help("interval between connections, in seconds (default 300)"),
        )
        .arg(
            Arg::new("o")
                .short('o')
                .action(ArgAction::SetTrue)
                .help("establish connection only once"),
        )
        .arg(value_arg("config", "FILE", "TOML file with default settings"))
        .arg(value_arg("log", "FILE", "append the SMTP conversation to FILE"))
        .arg(value_arg("timeout", "SECONDS", "socket timeout for each connection"))
        .arg(
            Arg::new("starttls")
                .long("starttls")
                .action(ArgAction::SetTrue)
                .help("upgrade to TLS when the server offers STARTTLS"),
        )
        .after_help("Options may be written with one dash, e.g. -port 587 -host mail.example.com")
}

pub(crate) fn print_help() {
    let _ = command().print_help();
}

pub(crate) fn normalize<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| {
            let long = arg
                .strip_prefix('-')
                .filter(|name| LONG_FLAGS.contains(name))
                .map(|name| format!("--{}", name));
            long.unwrap_or(arg)
        })
        .collect()
}

#[derive(Debug)]
pub(crate) struct Options {
    pub(crate) raw: RawConfig,
    pub(crate) config_file: Option<String>,
}

fn options(matches: &ArgMatches) -> Options {
    let value = |name: &str| matches.get_one::<String>(name).cloned();
    Options {
        raw: RawConfig {
            host: value("host"),
            port: value("port"),
            user: value("user"),
            password: value("pwd"),
            interval: value("i"),
            once: matches.get_flag("o"),
            timeout: value("timeout"),
            starttls: matches.get_flag("starttls"),
            logfile: value("log"),
        },
        config_file: value("config"),
    }
}

pub(crate) fn parse(args: Vec<String>) -> Result<Options, ConfigError> {
    let argv = std::iter::once(APP_NAME.to_string()).chain(normalize(args));
    let matches = command()
        .try_get_matches_from(argv)
        .map_err(|e| ConfigError::ParseFailure(e.kind().to_string()))?;
    Ok(options(&matches))
}

/// Command-line values win over the configuration file.
pub(crate) fn resolve(options: Options) -> Result<(ProbeConfig, Config, Option<String>), ConfigError> {
    let raw = match options.config_file.as_deref() {
        Some(path) => options.raw.merge(ProbeFile::load(path)?.destruct()),
        None => options.raw,
    };
    let probe = ProbeConfig::resolve(&raw)?;
    let transport = Config::try_from(&raw)?;
    Ok((probe, transport, raw.logfile))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_dash_long_options() {
        assert_eq!(
            normalize(args(&["-port", "25", "-i", "5", "-o", "-pwd", "-port"])),
            args(&["--port", "25", "-i", "5", "-o", "--pwd", "--port"])
        );
    }

    #[test]
    fn original_flags() {
        let options = parse(args(&[
            "-port", "587", "-host", "mail.example.com", "-user", "probe", "-pwd", "secret", "-i",
            "60", "-o",
        ]))
        .unwrap();
        let (probe, transport, logfile) = resolve(options).unwrap();
        assert_eq!(probe.host(), "mail.example.com");
        assert_eq!(probe.port(), 587);
        assert_eq!(probe.user(), "probe");
        assert_eq!(probe.password(), "secret");
        assert_eq!(probe.interval().as_secs(), 60);
        assert!(probe.run_once());
        assert_eq!(transport, Config::new());
        assert_eq!(logfile, None);
    }

    #[test]
    fn missing_required_option() {
        let options = parse(args(&["-port", "25", "-host", "h", "-user", "u"])).unwrap();
        assert_eq!(resolve(options).unwrap_err(), ConfigError::MissingField("pwd"));
    }

    #[test]
    fn unknown_flag_is_a_parse_failure() {
        let err = parse(args(&["-port", "25", "-x"])).unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailure(_)));
    }

    #[test]
    fn option_without_value_is_a_parse_failure() {
        let err = parse(args(&["-host"])).unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailure(_)));
    }

    #[test]
    fn password_may_start_with_a_dash() {
        let options = parse(args(&[
            "-port", "25", "-host", "h", "-user", "u", "-pwd", "-s3cret",
        ]))
        .unwrap();
        assert_eq!(options.raw.password.as_deref(), Some("-s3cret"));
    }

    #[test]
    fn negative_interval_reaches_the_resolver() {
        let options = parse(args(&[
            "-port", "25", "-host", "h", "-user", "u", "-pwd", "p", "-i", "-5",
        ]))
        .unwrap();
        assert!(matches!(
            resolve(options).unwrap_err(),
            ConfigError::InvalidInterval(_)
        ));
    }

    #[test]
    fn cli_overrides_file() {
        let path = std::env::temp_dir().join(format!("malooer-cli-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[server]\nhost = \"file.example.com\"\nport = 25\n[user]\nusername = \"u\"\npassword = \"p\"\n[config]\ninterval = 30\nlogfile = \"wire.log\"\n",
        )
        .unwrap();
        let options = parse(args(&[
            "-config",
            path.to_str().unwrap(),
            "-host",
            "cli.example.com",
            "-timeout",
            "7",
        ]))
        .unwrap();
        let (probe, transport, logfile) = resolve(options).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(probe.host(), "cli.example.com");
        assert_eq!(probe.port(), 25);
        assert_eq!(probe.interval().as_secs(), 30);
        assert_eq!(transport.timeout_secs(), Some(7));
        assert_eq!(logfile.as_deref(), Some("wire.log"));
    }

    #[test]
    fn command_is_well_formed() {
        command().debug_assert();
    }
}
