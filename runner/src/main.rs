use clap::{Parser, Subcommand};
use scmtiles_runner::{
    array_spec::IndexRange,
    cleaner::TileCleaner,
    collect::Collector,
    config::RunnerConfig,
    element::{resolve_context, ElementRunner},
    exit::{ExitStatus, E_BADARG, E_CONFIG, E_OK},
    launcher::{LaunchRequest, Launcher, Pipeline},
    materialize::ConfigMaterializer,
    scheduler::Schedulers,
};
use std::{error::Error, path::PathBuf, process::ExitCode};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML config file, defaults to ./scmtiles.yaml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// more log output on stderr, repeat for trace output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit the array jobs of a pipeline
    Launch {
        #[arg(long, value_enum, default_value_t = Pipeline::default())]
        pipeline: Pipeline,
        /// base name of the submitted jobs, stages are appended as `<name>_<stage>`
        job_base_name: String,
        /// comma separated indices and inclusive ranges, e.g. `13,15,18-21`
        index_range: String,
    },
    /// Print the start time of an array element
    StartTime {
        /// array index, read from the scheduler's index variable when absent
        #[arg(long)]
        index: Option<i64>,
    },
    /// Write the config of an array element and print its path
    Materialize {
        #[arg(long)]
        index: Option<i64>,
    },
    /// Remove stale tile output of an array element's time window
    Clean {
        #[arg(long)]
        index: Option<i64>,
    },
    /// Run a stage program for an array element with its config
    Exec {
        /// stage name used for the element log
        #[arg(long)]
        stage: String,
        #[arg(long)]
        index: Option<i64>,
        /// program and arguments, `{config}` is replaced by the config path
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    /// Print the status of every element of a launch as CSV
    Collect {
        /// collect post-processing only, assume the model ran
        #[arg(short, long)]
        pp: bool,
        job_base_name: String,
        index_range: String,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// log the error and its causes, then hand out its exit code
fn report<E: Error + ExitStatus>(error: E) -> ExitCode {
    error!("{error}");

    let mut source = error.source();
    while let Some(cause) = source {
        error!("  caused by: {cause}");
        source = cause.source();
    }

    error.exit_code()
}

fn run(cli: Cli) -> ExitCode {
    let config = match RunnerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return report(e),
    };

    if config.preflight_checks() {
        error!("Config contains errors, aborting");
        return ExitCode::from(E_CONFIG);
    }

    let index_variable = config.scheduler.index_variable.as_str();

    match cli.command {
        Commands::Launch {
            pipeline,
            job_base_name,
            index_range,
        } => {
            let request = match LaunchRequest::new(&job_base_name, &index_range) {
                Ok(request) => request,
                Err(e) => {
                    error!("  use -h or --help for help");
                    return report(e);
                }
            };
            let scheduler = match Schedulers::load(&config.scheduler) {
                Ok(scheduler) => scheduler,
                Err(e) => return report(e),
            };

            match Launcher::new(&config, scheduler).launch(&request, pipeline) {
                Ok(launch) => {
                    for receipt in std::iter::once(launch.primary).chain(launch.dependent) {
                        println!(
                            "{} {}",
                            receipt.job_name,
                            receipt.job_id.as_deref().unwrap_or("-")
                        );
                    }

                    ExitCode::from(E_OK)
                }
                Err(e) => report(e),
            }
        }
        Commands::StartTime { index } => match resolve_context(index, index_variable) {
            Ok(context) => {
                println!("{}", context.start_time());
                ExitCode::from(E_OK)
            }
            Err(e) => report(e),
        },
        Commands::Materialize { index } => {
            let context = match resolve_context(index, index_variable) {
                Ok(context) => context,
                Err(e) => return report(e),
            };

            match ConfigMaterializer::new(&config.paths.template, &config.paths.configs)
                .materialize(&context.start_time())
            {
                Ok(path) => {
                    println!("{}", path.display());
                    ExitCode::from(E_OK)
                }
                Err(e) => report(e),
            }
        }
        Commands::Clean { index } => {
            let context = match resolve_context(index, index_variable) {
                Ok(context) => context,
                Err(e) => return report(e),
            };

            match TileCleaner::new(&config.paths.work_dir)
                .and_then(|cleaner| cleaner.clean(&context.start_time()))
            {
                Ok(removed) => {
                    println!("{removed}");
                    ExitCode::from(E_OK)
                }
                Err(e) => report(e),
            }
        }
        Commands::Exec {
            stage,
            index,
            command,
        } => {
            let context = match resolve_context(index, index_variable) {
                Ok(context) => context,
                Err(e) => return report(e),
            };
            let Some((program, args)) = command.split_first() else {
                error!("No program given to exec");
                return ExitCode::from(E_BADARG);
            };

            match ElementRunner::new(&config, context).exec(&stage, program, args) {
                Ok(_) => ExitCode::from(E_OK),
                Err(e) => report(e),
            }
        }
        Commands::Collect {
            pp,
            job_base_name,
            index_range,
        } => {
            let range = match IndexRange::parse(&index_range) {
                Ok(range) => range,
                Err(e) => {
                    error!("{e}");
                    error!("  use -h or --help for help");
                    return ExitCode::from(E_BADARG);
                }
            };

            match Collector::new(&config.paths.logs, &config.paths.output_dir).collect(
                &job_base_name,
                &range,
                pp,
            ) {
                Ok(statuses) => {
                    for status in statuses {
                        println!("{}", status.to_csv());
                    }
                    ExitCode::from(E_OK)
                }
                Err(e) => report(e),
            }
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    run(cli)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn help_exits_successfully() {
        let error = Cli::try_parse_from(["scmtiles", "launch", "-h"]).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::DisplayHelp);
        assert_eq!(error.exit_code(), 0);
    }

    #[test]
    fn missing_arguments_are_usage_errors() {
        let error = Cli::try_parse_from(["scmtiles", "launch", "exp1"]).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(error.exit_code(), i32::from(E_BADARG));
    }

    #[test]
    fn launch_arguments() {
        let cli =
            Cli::try_parse_from(["scmtiles", "launch", "--pipeline", "cleanup", "exp1", "1-10"])
                .unwrap();

        match cli.command {
            Commands::Launch {
                pipeline,
                job_base_name,
                index_range,
            } => {
                assert_eq!(pipeline, Pipeline::Cleanup);
                assert_eq!(job_base_name, "exp1");
                assert_eq!(index_range, "1-10");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn exec_takes_trailing_command() {
        let cli = Cli::try_parse_from([
            "scmtiles", "exec", "--stage", "run", "--", "./master1c.exe", "-v", "{config}",
        ])
        .unwrap();

        match cli.command {
            Commands::Exec {
                stage,
                index,
                command,
            } => {
                assert_eq!(stage, "run");
                assert_eq!(index, None);
                assert_eq!(command, ["./master1c.exe", "-v", "{config}"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
