const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

macro_rules! env_or {
    ($key:literal, $default:literal) => {
        option_env!($key).unwrap_or($default)
    };
}

/// Build information baked in by `build.rs`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub version: &'static str,
    pub build_time: &'static str,
    pub branch: &'static str,
    pub commit: &'static str,
    pub profile: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            build_time: env_or!("BUILD_TIME", "unknown"),
            branch: env_or!("GIT_BRANCH", "unknown"),
            commit: env_or!("GIT_COMMIT", "unknown"),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
        }
    }
}

impl BuildInfo {
    pub fn commit_short(&self) -> &str {
        self.commit.get(..7).unwrap_or(self.commit)
    }
}

pub fn print_banner(info: &BuildInfo, address: &str) {
    crate::log_println!();
    crate::log_println!("{GREEN}  _ _     _                                     {RESET}");
    crate::log_println!("{GREEN} | (_)___| |_ ___ _ _  _ _ ___  ___ _ __        {RESET}");
    crate::log_println!("{GREEN} | | (_-<|  _/ -_) ' \\| '_/ _ \\/ _ \\ '  \\       {RESET}");
    crate::log_println!("{GREEN} |_|_/__/ \\__\\___|_||_|_| \\___/\\___/_|_|_|      {RESET}");
    crate::log_println!("{DIM}================================================{RESET}");
    crate::log_println!();

    print_row("Version", info.version, CYAN);
    print_row("Build time", info.build_time, RESET);
    print_row("Branch", info.branch, RESET);
    print_row("Commit", info.commit_short(), RESET);
    print_row("Profile", info.profile, YELLOW);
    print_row("Listening", address, BOLD);
    crate::log_println!();
}

fn print_row(label: &str, value: &str, color: &str) {
    crate::log_println!("  {BOLD}{label:<14}{RESET}{color}{value}{RESET}");
}
