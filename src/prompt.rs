use nix::unistd::{geteuid, gethostname, User};
use once_cell::sync::Lazy;
use std::env;
use std::path::{Path, PathBuf};

static HOME: Lazy<Option<PathBuf>> = Lazy::new(dirs_next::home_dir);

/// Builds `user@host:cwd$ `, with cwd shortened to `~` under home.
pub fn render_prompt(color: bool) -> String {
    let user = User::from_uid(geteuid())
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_else(|| "unknown".to_string());
    let host = gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    let cwd = match env::current_dir() {
        Ok(cwd) => abbreviate_home(&cwd, HOME.as_deref()),
        Err(_) => "?".to_string(),
    };
    format_prompt(&user, &host, &cwd, color)
}

fn format_prompt(user: &str, host: &str, cwd: &str, color: bool) -> String {
    if color {
        format!("\x1b[1;32m{user}@{host}\x1b[0m:\x1b[1;34m{cwd}\x1b[0m$ ")
    } else {
        format!("{user}@{host}:{cwd}$ ")
    }
}

/// Replaces a leading home directory with `~`, only on a path component
/// boundary (`/home/al` does not abbreviate `/home/alice`).
pub fn abbreviate_home(cwd: &Path, home: Option<&Path>) -> String {
    match home.and_then(|home| cwd.strip_prefix(home).ok()) {
        Some(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Some(rest) => format!("~/{}", rest.display()),
        None => cwd.display().to_string(),
    }
}
