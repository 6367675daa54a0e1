pub mod check;
pub mod list;
pub mod mock_engine;
pub mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use shorebench::affinity::BinderKind;
use shorebench::catalog::Catalog;

pub const DEFAULT_OUTPUT: &str = "output.log";
pub const DEFAULT_TEMPLATE: &str = "shore.conf.template";
pub const DEFAULT_START_PORT: u16 = 5000;

#[derive(Args, Clone)]
pub struct CatalogArgs {
    // JSON CATALOG OF CONFIGURATIONS AND RUNS (BUILT-IN CATALOG IF UNSET)
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

impl CatalogArgs {
    pub fn load(&self) -> Result<Catalog> {
        Ok(match &self.catalog {
            Some(path) => Catalog::load(path)?,
            None => Catalog::builtin(),
        })
    }
}

#[derive(Args, Clone)]
pub struct RunArgs {
    // OUTPUT LOG FILE FOR RESULTS
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    // TEMPLATE USED TO GENERATE shore.conf
    #[arg(short = 't', long, default_value = DEFAULT_TEMPLATE)]
    pub template: PathBuf,

    // DIRECTORY CONTAINING THE shore_kits EXECUTABLE (DEFAULT: <cwd>/..)
    #[arg(short = 'p', long)]
    pub path: Option<PathBuf>,

    // TEMPORARY DIRECTORY FOR DATABASES (DEFAULT: /tmpfs/$USER)
    #[arg(short = 'T', long)]
    pub temp: Option<PathBuf>,

    // FIRST PORT; EACH INSTANCE OF EACH RUN TAKES THE NEXT ONE
    #[arg(short = 'P', long, default_value_t = DEFAULT_START_PORT)]
    pub start_port: u16,

    #[command(flatten)]
    pub catalog: CatalogArgs,

    // ONLY EXECUTE THESE RUNS (REPEATABLE). STILL ASCENDING BY NAME.
    #[arg(long = "run")]
    pub runs: Vec<String>,

    // CORE PINNING MECHANISM (DEFAULT: taskset ON LINUX, psrset ON SOLARIS)
    #[arg(long, value_enum)]
    pub binder: Option<BinderKind>,

    // HOW OFTEN TO CHECK shore.log AND CHILD EXIT
    #[arg(long, default_value = "1s")]
    pub poll_interval: humantime::Duration,

    // GIVE UP ON A SERVER THAT IS NOT READY AFTER THIS LONG (DEFAULT: NEVER)
    #[arg(long)]
    pub start_timeout: Option<humantime::Duration>,

    // GIVE UP ON A SERVER THAT HAS NOT EXITED AFTER THIS LONG (DEFAULT: NEVER)
    #[arg(long)]
    pub stop_timeout: Option<humantime::Duration>,

    // ON A FAILED RUN, KILL AND CLEAN THE INSTANCES ALREADY STARTED
    #[arg(long)]
    pub kill_on_failure: bool,
}

impl RunArgs {
    pub fn exe_dir(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("..")
        })
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp.clone().unwrap_or_else(|| {
            PathBuf::from(format!("/tmpfs/{}", std::env::var("USER").unwrap_or_default()))
        })
    }

    pub fn binder_kind(&self) -> BinderKind {
        self.binder.unwrap_or_else(BinderKind::platform_default)
    }
}
