use std::io::IsTerminal;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use argh::FromArgs;
use discovery::{TargetGroup, to_file_sd};
use exitcode::ExitCode;
use ovhcloud_sd::config::Config;
use ovhcloud_sd::ovhcloud::{Context, OvhCloud};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(4)
}

#[derive(FromArgs)]
#[argh(
    description = "Discover OVHcloud VPS and dedicated servers as Prometheus file_sd targets",
    help_triggers("-h", "--help")
)]
pub struct RootCommand {
    #[argh(switch, short = 'v', description = "show version")]
    version: bool,

    #[argh(
        option,
        short = 'l',
        default = "\"info\".to_string()",
        description = "log level"
    )]
    log_level: String,

    #[argh(switch, description = "write logs as JSON")]
    log_json: bool,

    #[argh(option, short = 'c', long = "config", description = "configuration file")]
    config: Option<PathBuf>,

    #[argh(
        option,
        short = 'o',
        description = "write targets to this file instead of stdout"
    )]
    output: Option<PathBuf>,

    #[argh(switch, description = "run one discovery cycle and exit")]
    once: bool,

    #[argh(
        option,
        short = 't',
        default = "default_worker_threads()",
        description = "specify how many threads the Tokio runtime will use"
    )]
    threads: usize,
}

impl RootCommand {
    #![allow(clippy::print_stdout)]
    fn show_version(&self) {
        println!("ovhcloud-sd {}", env!("CARGO_PKG_VERSION"));
    }

    pub fn run(&self) -> Result<(), ExitCode> {
        if self.version {
            self.show_version();
            return Ok(());
        }

        let Some(path) = self.config.clone() else {
            eprintln!("missing required option --config, see --help");
            return Err(exitcode::USAGE);
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("ovhcloud-sd-worker")
            .worker_threads(self.threads.max(1))
            .enable_io()
            .enable_time()
            .build()
            .map_err(|err| {
                eprintln!("build tokio runtime failed, {err}");
                exitcode::OSERR
            })?;

        let levels = std::env::var("OVHCLOUD_SD_LOG")
            .unwrap_or_else(|_| ovhcloud_sd::trace::levels(&self.log_level));
        let color = std::io::stderr().is_terminal();
        ovhcloud_sd::trace::init(color, self.log_json, &levels);

        let output = match &self.output {
            Some(path) => Output::File(path.clone()),
            None => Output::Stdout,
        };
        let once = self.once;

        runtime.block_on(async move {
            let config = Config::load(&path).map_err(|err| {
                error!(message = "load config failed", ?path, %err);
                exitcode::CONFIG
            })?;

            if config.skip_auth_check {
                info!(message = "authentication check skipped");
            } else {
                config.check_auth().await.map_err(|err| {
                    error!(message = "verify credentials failed", %err);
                    exitcode::CONFIG
                })?;
            }

            let shutdown = CancellationToken::new();
            tokio::spawn(wait_for_signal(shutdown.clone()));

            run(&config, &output, shutdown, once).await
        })?;

        runtime.shutdown_timeout(Duration::from_secs(5));

        Ok(())
    }
}

async fn wait_for_signal(shutdown: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(err), _) | (_, Err(err)) => {
            error!(message = "set up signal handler failed", %err);
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => info!(message = "SIGINT received, shutting down"),
        _ = sigterm.recv() => info!(message = "SIGTERM received, shutting down"),
    }

    shutdown.cancel();
}

/// Refresh every `refresh_interval` until `shutdown` is cancelled.
///
/// A cycle which fails, or is cancelled, leaves the previous output in place.
async fn run(
    config: &Config,
    output: &Output,
    shutdown: CancellationToken,
    once: bool,
) -> Result<(), ExitCode> {
    let sd = OvhCloud::new(config);
    let timeout = config.refresh_timeout();

    info!(
        message = "start discovery",
        sources = ?sd.sources(),
        interval = ?config.refresh_interval,
        ?timeout
    );

    let mut ticker = tokio::time::interval(config.refresh_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let token = shutdown.child_token();
        let cx = Context::new(token.clone());

        let refresh = sd.refresh(&cx);
        tokio::pin!(refresh);
        let result = tokio::select! {
            result = &mut refresh => result,
            _ = tokio::time::sleep(timeout) => {
                warn!(message = "refresh timed out, cancel it", ?timeout);
                token.cancel();
                refresh.await
            }
        };

        let written = match result {
            Ok(_) if cx.is_cancelled() => {
                warn!(message = "refresh cancelled, keep previous targets");
                false
            }
            Ok(groups) => match output.write(&groups).await {
                Ok(()) => {
                    debug!(
                        message = "targets updated",
                        groups = groups.len(),
                        targets = groups.iter().map(TargetGroup::len).sum::<usize>()
                    );

                    true
                }
                Err(err) => {
                    error!(message = "write targets failed", %err);
                    false
                }
            },
            Err(err) => {
                error!(message = "refresh failed, keep previous targets", %err);
                false
            }
        };

        if once {
            return if written {
                Ok(())
            } else {
                Err(exitcode::UNAVAILABLE)
            };
        }
    }

    info!(message = "discovery stopped");

    Ok(())
}

enum Output {
    Stdout,
    File(PathBuf),
}

impl Output {
    /// Render `groups` in the `file_sd` format, a file is replaced atomically
    /// so readers never see a partial document.
    async fn write(&self, groups: &[TargetGroup]) -> ovhcloud_sd::Result<()> {
        let mut data = serde_json::to_vec_pretty(&to_file_sd(groups))?;
        data.push(b'\n');

        match self {
            Output::Stdout => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(&data).await?;
                stdout.flush().await?;
            }
            Output::File(path) => {
                let mut tmp = path.clone().into_os_string();
                tmp.push(".tmp");

                tokio::fs::write(&tmp, &data).await?;
                tokio::fs::rename(&tmp, path).await?;
            }
        }

        Ok(())
    }
}
