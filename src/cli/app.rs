//! Main CLI application

use crate::config::{
    lint_templates, order_requested, parse_project_file, parse_projects_auto, validate_projects,
    ExternalConfig, Projects,
};
use crate::runner::{Environment, Maker, Project, Resolver, Sequencer, TaskState};
use crate::ui::{Logger, Verbosity};
use anyhow::{anyhow, bail};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use colored::Colorize;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("rassemble")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Assemble deployments from declarative, templated project files")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Path to rassemble.yml project file")
                .global(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("External settings file (default: user config directory)")
                .global(true),
        )
        .arg(
            Arg::new("env-file")
                .long("env-file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Load extra env.vars from a dotenv file")
                .global(true),
        )
        .arg(
            Arg::new("base-path")
                .long("base-path")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory relative task paths resolve against (default: project file directory)")
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print warnings and errors")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print task descriptions and command output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Run the tasks of one or more projects")
                .arg(
                    Arg::new("projects")
                        .value_name("PROJECT")
                        .required(true)
                        .num_args(1..)
                        .help("Projects to run; required projects run first when also named"),
                )
                .arg(
                    Arg::new("simulate")
                        .short('n')
                        .long("simulate")
                        .help("Describe every effect without performing it")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("set")
                        .long("set")
                        .value_name("[PROJECT.]NAME=VALUE")
                        .help("Override a setting")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("yes")
                        .short('y')
                        .long("yes")
                        .help("Never prompt; use each question's default answer")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("list").about("List projects"))
        .subcommand(
            Command::new("settings")
                .about("Show a project's settings and their resolved values")
                .arg(Arg::new("project").value_name("PROJECT").required(true))
                .arg(
                    Arg::new("set")
                        .long("set")
                        .value_name("[PROJECT.]NAME=VALUE")
                        .help("Override a setting")
                        .action(ArgAction::Append),
                ),
        )
        .subcommand(Command::new("check").about("Validate the project file and every template in it"))
        .subcommand(
            Command::new("completions")
                .about("Print a shell completion script")
                .arg(
                    Arg::new("shell")
                        .value_name("SHELL")
                        .required(true)
                        .value_parser(value_parser!(Shell)),
                ),
        )
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Run the CLI application with the process arguments
pub fn run() -> anyhow::Result<()> {
    run_from(std::env::args_os())
}

/// Run the CLI application with the given arguments
pub fn run_from<I, T>(args: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = match build_command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(e) => e.exit(),
    };
    let verbosity = get_verbosity(&matches);

    match matches.subcommand() {
        Some(("completions", sub)) => {
            let shell = sub
                .get_one::<Shell>("shell")
                .copied()
                .ok_or_else(|| anyhow!("missing shell"))?;
            clap_complete::generate(shell, &mut build_command(), "rassemble", &mut io::stdout());
            Ok(())
        }
        Some(("list", _)) => {
            let projects = load_projects(&matches)?;
            list_projects(&projects);
            Ok(())
        }
        Some(("check", _)) => {
            let projects = load_projects(&matches)?;
            check_projects(&projects, verbosity)
        }
        Some(("settings", sub)) => {
            let projects = load_projects(&matches)?;
            let env = load_environment(&matches, sub, &projects)?;
            let name = sub
                .get_one::<String>("project")
                .ok_or_else(|| anyhow!("missing project"))?;
            show_settings(&projects, &env, name)
        }
        Some(("run", sub)) => {
            let projects = load_projects(&matches)?;
            let env = load_environment(&matches, sub, &projects)?;
            run_projects(&projects, env, sub, verbosity)
        }
        _ => {
            build_command().print_help()?;
            Ok(())
        }
    }
}

fn load_projects(matches: &ArgMatches) -> anyhow::Result<Projects> {
    let projects = match matches.get_one::<PathBuf>("file") {
        Some(path) => parse_project_file(path)?,
        None => parse_projects_auto()?,
    };
    validate_projects(&projects)?;
    debug!(path = ?projects.path, count = projects.projects.len(), "loaded projects");
    Ok(projects)
}

fn load_environment(
    matches: &ArgMatches,
    sub: &ArgMatches,
    projects: &Projects,
) -> anyhow::Result<Environment> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ExternalConfig::load(path)?,
        None => ExternalConfig::load_default()?,
    };
    for spec in sub.get_many::<String>("set").into_iter().flatten() {
        config.apply_override(spec)?;
    }

    let base_path = match matches.get_one::<PathBuf>("base-path") {
        Some(dir) => absolute(dir)?,
        None => match projects.path.as_deref().and_then(Path::parent) {
            Some(dir) if !dir.as_os_str().is_empty() => absolute(dir)?,
            _ => std::env::current_dir()?,
        },
    };

    let simulate = sub.try_get_one::<bool>("simulate").ok().flatten().copied().unwrap_or(false);
    let mut env = Environment::new(base_path)
        .with_config(config)
        .with_simulate(simulate);
    if let Some(path) = matches.get_one::<PathBuf>("env-file") {
        env = env.with_env_file(path)?;
    }
    Ok(env)
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn list_projects(projects: &Projects) {
    for project in &projects.projects {
        let mut line = format!("{}", project.name.bold());
        if let Some(title) = &project.title {
            line.push_str(&format!(" - {}", title));
        }
        if !project.requires.is_empty() {
            line.push_str(&format!(" (requires: {})", project.requires.join(", ")));
        }
        line.push_str(&format!(" [{} tasks]", project.tasks.len()));
        println!("{}", line);
    }
}

fn check_projects(projects: &Projects, verbosity: Verbosity) -> anyhow::Result<()> {
    let problems = lint_templates(projects);
    let mut logger = Logger::new(verbosity);
    for problem in &problems {
        logger.error(&format!("{}: {}", problem.location, problem.error));
    }
    if !problems.is_empty() {
        bail!("{} template problem(s) found", problems.len());
    }
    logger.notify(&format!("{} project(s) OK", projects.projects.len()));
    Ok(())
}

fn show_settings(projects: &Projects, env: &Environment, name: &str) -> anyhow::Result<()> {
    let def = projects
        .get(name)
        .ok_or_else(|| crate::error::ConfigError::ProjectNotFound(name.to_string()))?;
    let project = Project::from_config(def.clone());
    let cx = Resolver::new(env, &project);

    println!("{}", project.display_title().bold());
    for setting in &project.settings {
        let value = match cx.setting(&setting.name) {
            Ok(value) => value.to_string(),
            Err(e) => format!("{}", format!("<{}>", e).red()),
        };
        println!("  {} = {}", setting.name, value);
        if let Some(help) = &setting.help {
            println!("      {}", help.dimmed());
        }
    }
    Ok(())
}

fn run_projects(
    projects: &Projects,
    env: Environment,
    sub: &ArgMatches,
    verbosity: Verbosity,
) -> anyhow::Result<()> {
    let requested: Vec<String> = sub
        .get_many::<String>("projects")
        .into_iter()
        .flatten()
        .cloned()
        .collect();
    let ordered: Vec<Project> = order_requested(projects, &requested)?
        .into_iter()
        .map(|def| Project::from_config(def.clone()))
        .collect();

    let simulate = env.simulate;
    let mut maker = Maker::new(Logger::new(verbosity)).with_simulate(simulate);
    if sub.get_flag("yes") {
        maker = maker.with_interactive(false);
    }

    let mut sequencer = Sequencer::new(env, maker);
    let reports = sequencer.run_projects(&ordered);

    let mut logger = Logger::new(verbosity);
    for report in &reports {
        let done = if simulate {
            report.count(TaskState::Simulated)
        } else {
            report.count(TaskState::Succeeded)
        };
        logger.notify(&format!(
            "{}: {} {}, {} up to date",
            report.project,
            done,
            if simulate { "simulated" } else { "done" },
            report.count(TaskState::UpToDate)
        ));
    }

    match reports.into_iter().find_map(|report| report.error) {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}
