//! apiprobe: generate executable test plans from an OpenAPI 2.0 document
//! and run them against a live server.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use apiprobe_error::{ProbeError, Result};
use apiprobe_plan::{
    generate_object_plan, generate_path_plan, generate_simple_plan, report, write_result_file,
    ReqwestDispatcher, Runtime, TestPlan,
};
use apiprobe_spec::{build_dag, ApiSpec};
use tracing::info;

const DEFAULT_DATA_DIR: &str = "meqa_data";
const ALGO_SIMPLE: &str = "simple";
const ALGO_OBJECT: &str = "object";
const ALGO_PATH: &str = "path";
const ALGO_ALL: &str = "all";

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }
    let code = match args[1].as_str() {
        "generate" => run_generate(&args[2..]),
        "run" => run_run(&args[2..]),
        "-h" | "--help" | "help" => {
            print_usage();
            0
        }
        other => {
            eprintln!("Unknown subcommand: {other}\n");
            print_usage();
            1
        }
    };
    process::exit(code);
}

fn print_usage() {
    eprintln!("Usage: apiprobe {{generate|run}} [options]");
    eprintln!();
    eprintln!("generate: generate test plans to be used by the run command");
    eprintln!("  -d DIR    the directory for generated files and logs (default {DEFAULT_DATA_DIR})");
    eprintln!("  -s FILE   the OpenAPI (swagger) file (default DIR/swagger.yml)");
    eprintln!("  -a ALGO   the algorithm - simple, object, path, all (default {ALGO_PATH})");
    eprintln!("  -w FILE   whitelist file of suite names to keep (path algorithm)");
    eprintln!("  -v        verbose mode");
    eprintln!();
    eprintln!("run: run the tests in a test plan file");
    eprintln!("  -d DIR    the directory for temp files and logs (default {DEFAULT_DATA_DIR})");
    eprintln!("  -s FILE   the OpenAPI (swagger) file (default DIR/swagger.yml)");
    eprintln!("  -p FILE   the test plan file");
    eprintln!("  -r FILE   the result file (default DIR/result.yml)");
    eprintln!("  -t NAME   the test suite to run, or 'all' (default all)");
    eprintln!("  -u USER   username for basic HTTP authentication");
    eprintln!("  -w PASS   password for basic HTTP authentication");
    eprintln!("  -a TOKEN  bearer token for HTTP authentication");
    eprintln!("  -v        verbose mode");
}

struct FlagParser<'a> {
    args: &'a [String],
    pos: usize,
}

impl<'a> FlagParser<'a> {
    fn new(args: &'a [String]) -> Self {
        Self { args, pos: 0 }
    }

    fn next_flag(&mut self) -> Option<&'a str> {
        let flag = self.args.get(self.pos)?;
        self.pos += 1;
        Some(flag.as_str())
    }

    fn value(&mut self, flag: &str) -> std::result::Result<String, String> {
        match self.args.get(self.pos) {
            Some(v) => {
                self.pos += 1;
                Ok(v.clone())
            }
            None => Err(format!("flag {flag} requires a value")),
        }
    }
}

fn init_logging(dir: &Path, verbose: bool) -> Result<()> {
    let file = std::fs::File::create(dir.join("apiprobe.log"))?;
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
    Ok(())
}

fn ensure_data_dir(dir: &Path) -> std::result::Result<(), String> {
    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(format!("{} is not a directory", dir.display())),
        Err(_) => std::fs::create_dir_all(dir)
            .map_err(|err| format!("cannot create directory {}: {err}", dir.display())),
    }
}

fn run_generate(args: &[String]) -> i32 {
    let mut dir = PathBuf::from(DEFAULT_DATA_DIR);
    let mut spec_file: Option<PathBuf> = None;
    let mut algorithm = ALGO_PATH.to_owned();
    let mut whitelist_file: Option<PathBuf> = None;
    let mut verbose = false;

    let mut parser = FlagParser::new(args);
    while let Some(flag) = parser.next_flag() {
        let outcome = match flag {
            "-d" => parser.value(flag).map(|v| dir = PathBuf::from(v)),
            "-s" => parser.value(flag).map(|v| spec_file = Some(PathBuf::from(v))),
            "-a" => parser.value(flag).map(|v| algorithm = v),
            "-w" => parser
                .value(flag)
                .map(|v| whitelist_file = Some(PathBuf::from(v))),
            "-v" => {
                verbose = true;
                Ok(())
            }
            "-h" | "--help" => {
                print_usage();
                return 0;
            }
            other => Err(format!("unknown flag {other}")),
        };
        if let Err(message) = outcome {
            eprintln!("{message}");
            print_usage();
            return 1;
        }
    }

    if let Err(message) = ensure_data_dir(&dir) {
        eprintln!("{message}");
        return 1;
    }
    if let Err(err) = init_logging(&dir, verbose) {
        eprintln!("cannot open the log file: {err}");
        return 1;
    }
    let spec_file = spec_file.unwrap_or_else(|| dir.join("swagger.yml"));

    match generate(&dir, &spec_file, &algorithm, whitelist_file.as_deref()) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{err}");
            err.exit_code()
        }
    }
}

fn load_whitelist(path: &Path) -> Result<HashSet<String>> {
    let data = std::fs::read_to_string(path)?;
    Ok(data
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

fn generate(dir: &Path, spec_file: &Path, algorithm: &str, whitelist: Option<&Path>) -> Result<()> {
    let spec = ApiSpec::from_file(spec_file)?;
    let dag = build_dag(&spec)?;
    let whitelist = match whitelist {
        Some(path) => Some(load_whitelist(path)?),
        None => None,
    };

    let algorithms: Vec<&str> = match algorithm {
        ALGO_ALL => vec![ALGO_SIMPLE, ALGO_OBJECT, ALGO_PATH],
        ALGO_SIMPLE | ALGO_OBJECT | ALGO_PATH => vec![algorithm],
        other => {
            return Err(ProbeError::internal(format!(
                "unknown algorithm '{other}', expected simple, object, path or all"
            )))
        }
    };

    for algo in algorithms {
        let plan = match algo {
            ALGO_SIMPLE => generate_simple_plan(&dag)?,
            ALGO_OBJECT => generate_object_plan(&dag)?,
            _ => generate_path_plan(&dag, whitelist.as_ref())?,
        };
        let plan_file = dir.join(format!("{algo}.yml"));
        plan.dump_to_file(&plan_file)?;
        info!(file = %plan_file.display(), "test plan generated");
        println!("Test plan generated at: {}", plan_file.display());
    }
    Ok(())
}

fn run_run(args: &[String]) -> i32 {
    let mut dir = PathBuf::from(DEFAULT_DATA_DIR);
    let mut spec_file: Option<PathBuf> = None;
    let mut plan_file: Option<PathBuf> = None;
    let mut result_file: Option<PathBuf> = None;
    let mut suite = ALGO_ALL.to_owned();
    let mut username = String::new();
    let mut password = String::new();
    let mut api_token = String::new();
    let mut verbose = false;

    let mut parser = FlagParser::new(args);
    while let Some(flag) = parser.next_flag() {
        let outcome = match flag {
            "-d" => parser.value(flag).map(|v| dir = PathBuf::from(v)),
            "-s" => parser.value(flag).map(|v| spec_file = Some(PathBuf::from(v))),
            "-p" => parser.value(flag).map(|v| plan_file = Some(PathBuf::from(v))),
            "-r" => parser.value(flag).map(|v| result_file = Some(PathBuf::from(v))),
            "-t" => parser.value(flag).map(|v| suite = v),
            "-u" => parser.value(flag).map(|v| username = v),
            "-w" => parser.value(flag).map(|v| password = v),
            "-a" => parser.value(flag).map(|v| api_token = v),
            "-v" => {
                verbose = true;
                Ok(())
            }
            "-h" | "--help" => {
                print_usage();
                return 0;
            }
            other => Err(format!("unknown flag {other}")),
        };
        if let Err(message) = outcome {
            eprintln!("{message}");
            print_usage();
            return 1;
        }
    }

    let Some(plan_file) = plan_file else {
        eprintln!("You must use -p to specify a test plan file. Use -h to see more options.");
        return 1;
    };
    if let Err(message) = ensure_data_dir(&dir) {
        eprintln!("{message}");
        return 1;
    }
    if let Err(err) = init_logging(&dir, verbose) {
        eprintln!("cannot open the log file: {err}");
        return 1;
    }
    let spec_file = spec_file.unwrap_or_else(|| dir.join("swagger.yml"));
    let result_file = result_file.unwrap_or_else(|| dir.join("result.yml"));

    match run(
        &spec_file,
        &plan_file,
        &result_file,
        &suite,
        &username,
        &password,
        &api_token,
        verbose,
    ) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{err}");
            err.exit_code()
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    spec_file: &Path,
    plan_file: &Path,
    result_file: &Path,
    suite: &str,
    username: &str,
    password: &str,
    api_token: &str,
    verbose: bool,
) -> Result<()> {
    let spec = Arc::new(ApiSpec::from_file(spec_file)?);
    let mut plan = TestPlan::from_file(plan_file)?;
    plan.set_credentials(username, password, api_token);

    let client = ReqwestDispatcher::new()?;
    let mut runtime = Runtime::new(spec, Box::new(client));
    runtime.verbose = verbose;

    let only = if suite == ALGO_ALL { None } else { Some(suite) };
    let counts = runtime.run_plan(&plan, only);

    report::log_errors(&runtime.results);
    report::print_summary(&counts);

    let timestamp = chrono::Local::now().to_rfc3339();
    write_result_file(&runtime.results, &timestamp, result_file)?;
    info!(file = %result_file.display(), "results written");
    Ok(())
}
