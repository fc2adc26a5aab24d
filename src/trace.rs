use tracing_subscriber::EnvFilter;

/// Level directives for every crate of this workspace, `off` silences
/// everything.
pub fn levels(level: &str) -> String {
    match level {
        "off" => "off".to_string(),
        level => ["ovhcloud_sd", "ovh", "discovery"]
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(","),
    }
}

/// Install the global subscriber, logs are written to stderr since stdout
/// may carry the discovered targets.
pub fn init(color: bool, json: bool, levels: &str) {
    let filter = EnvFilter::try_new(levels).unwrap_or_else(|err| {
        eprintln!("invalid log level \"{levels}\", {err}, fallback to info");
        EnvFilter::new("info")
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(color)
        .with_writer(std::io::stderr);

    let result = if json {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.try_init()
    };

    if let Err(err) = result {
        eprintln!("init tracing subscriber failed, {err}");
    }
}
