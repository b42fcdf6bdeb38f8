//! `pinf` - inspect the effective configuration of PINF programs and packages.

use anyhow::{Context, Result};
use clap::Parser;
use pinf_config::cli::{Cli, Command, LocateArgs, ModuleArgs};
use pinf_config::config::locate;
use pinf_config::logging::{self, LogTarget};
use pinf_config::{EffectiveConfig, ModuleRef, Pinf, run};
use serde_json::{Value, json};
use std::process::ExitCode;
use tracing::debug;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on --log option
    let target = cli.log.parse().unwrap_or(LogTarget::Stderr);
    if let Err(err) = logging::init(&target, cli.verbose) {
        eprintln!("Error: {err:?}");
        return ExitCode::FAILURE;
    }

    run(|| execute(&cli))
}

fn execute(cli: &Cli) -> Result<()> {
    let output = match &cli.command {
        Command::Config(args) => {
            let module = resolve(cli, args)?;
            module.config(Value::Null)
        }
        Command::Env(args) => resolve(cli, args)?.env().clone(),
        Command::Paths(args) => {
            let module = resolve(cli, args)?;
            json!({
                "identity": module.identity(),
                "paths": module.paths(),
                "sources": module
                    .sources()
                    .iter()
                    .map(|(source, path)| json!({"source": source.to_string(), "path": path}))
                    .collect::<Vec<_>>(),
            })
        }
        Command::Locate(LocateArgs { start, file }) => {
            let found = locate(start, file)
                .with_context(|| format!("No `{file}` found for path '{}'", start.display()))?;
            json!(found)
        }
    };

    println!("{}", cli.format.render(&output)?);
    Ok(())
}

fn resolve(cli: &Cli, args: &ModuleArgs) -> Result<EffectiveConfig> {
    let options = cli.program_options();
    let package_dir = match &args.path {
        Some(path) => options.cwd.join(path),
        None => options
            .package
            .parent()
            .map(|dir| dir.to_path_buf())
            .unwrap_or_else(|| options.cwd.clone()),
    };
    debug!(package = %package_dir.display(), program = %options.program.display(), "Resolving module");

    let mut module = ModuleRef::dir(package_dir);
    if let Some(uid) = &args.uid {
        module = module.with_uid(uid);
    }
    if let Some(iid) = &args.iid {
        module = module.with_iid(iid);
    }

    let pinf = Pinf::for_program(options).with_loader_options(cli.loader_options());
    Ok(pinf.resolve(module, args.ns.as_deref())?)
}
