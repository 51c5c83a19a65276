//! Help finding the EPSG code of a file by searching the web for its name.

use crate::backend::command::run_tool;
use crate::error::CollaboratorError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Command;
use tracing::info;

const SEARCH_URL: &str = "https://www.google.com/?#q=projection+crs+epsg+";

/// Characters treated as word breaks in file names.
static RE_WORD_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_.\-]").unwrap());

/// Search URL for the CRS of `file_name`.
///
/// ```rust
/// assert_eq!(
///     las2geo::epsg_search_url("utm_zone-32.las"),
///     "https://www.google.com/?#q=projection+crs+epsg+utm+zone+32+las"
/// );
/// ```
pub fn epsg_search_url(file_name: &str) -> String {
    format!("{SEARCH_URL}{}", RE_WORD_BREAK.replace_all(file_name, "+"))
}

/// Open a web search for the CRS of `file_name` in the default browser.
pub fn lookup_epsg(file_name: &str) -> Result<(), CollaboratorError> {
    let url = epsg_search_url(file_name);
    info!("Opening {}", url);
    let (program, mut command) = browser_command(&url);
    run_tool(program, &mut command, None)?;
    Ok(())
}

#[cfg(target_os = "macos")]
fn browser_command(url: &str) -> (&'static str, Command) {
    let mut command = Command::new("open");
    command.arg(url);
    ("open", command)
}

#[cfg(target_os = "windows")]
fn browser_command(url: &str) -> (&'static str, Command) {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", "", url]);
    ("cmd", command)
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn browser_command(url: &str) -> (&'static str, Command) {
    let mut command = Command::new("xdg-open");
    command.arg(url);
    ("xdg-open", command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_become_plus() {
        assert_eq!(
            epsg_search_url("NAD83_UTM-zone.17"),
            format!("{SEARCH_URL}NAD83+UTM+zone+17")
        );
    }

    #[test]
    fn each_separator_is_replaced() {
        assert!(epsg_search_url("a__b").ends_with("a++b"));
    }

    #[test]
    fn plain_name_is_appended() {
        assert_eq!(epsg_search_url("lidar"), format!("{SEARCH_URL}lidar"));
    }
}
