//! Opens the OAuth consent page in the default browser.
//!
//! WSL gets the Windows browser through `wslview`, `cmd.exe` or PowerShell.

use std::process::{Command, Stdio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Platform {
    Windows,
    MacOs,
    Wsl,
    Linux,
    Other,
}

impl Platform {
    fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            let wsl = std::fs::read_to_string("/proc/version")
                .map(|version| is_wsl_kernel(&version))
                .unwrap_or(false);
            if wsl {
                Platform::Wsl
            } else {
                Platform::Linux
            }
        } else {
            Platform::Other
        }
    }
}

/// Whether a `/proc/version` line belongs to a WSL kernel.
fn is_wsl_kernel(version: &str) -> bool {
    let version = version.to_lowercase();
    version.contains("microsoft") || version.contains("wsl")
}

/// Launcher commands to try in order, as (program, full argument list).
fn launchers(platform: Platform, url: &str) -> Vec<(&'static str, Vec<String>)> {
    let start = |prefix: &[&str]| {
        let mut args: Vec<String> = prefix.iter().map(|arg| arg.to_string()).collect();
        args.push(url.to_string());
        args
    };

    match platform {
        Platform::Windows => vec![("cmd", start(&["/c", "start", ""]))],
        Platform::MacOs => vec![("open", start(&[]))],
        Platform::Wsl => vec![
            ("wslview", start(&[])),
            ("cmd.exe", start(&["/c", "start", ""])),
            (
                "powershell.exe",
                vec![
                    "-Command".to_string(),
                    format!("Start-Process '{}'", url.replace('\'', "''")),
                ],
            ),
        ],
        Platform::Linux => vec![("xdg-open", start(&[]))],
        Platform::Other => Vec::new(),
    }
}

/// Opens `url` in the default browser.
///
/// Returns `false` when no launcher could be spawned; the caller still has the
/// URL printed on the terminal.
pub fn open_browser(url: &str) -> bool {
    for (program, args) in launchers(Platform::current(), url) {
        let mut command = Command::new(program);
        command.args(&args).stderr(Stdio::null());

        // Windows tools complain about UNC paths when started from a WSL directory
        if program.ends_with(".exe") {
            command.current_dir("/mnt/c/");
        }

        if command.spawn().is_ok() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://accounts.google.com/o/oauth2/auth?client_id=a&scope=b";

    #[test]
    fn test_is_wsl_kernel() {
        assert!(is_wsl_kernel(
            "Linux version 5.15.90.1-microsoft-standard-WSL2 (gcc 11.2.0)"
        ));
        assert!(!is_wsl_kernel(
            "Linux version 6.5.0-14-generic (buildd@lcy02-amd64-031) (gcc 12.3.0)"
        ));
    }

    #[test]
    fn test_wsl_falls_back_to_windows_launchers() {
        let programs: Vec<&str> = launchers(Platform::Wsl, URL)
            .into_iter()
            .map(|(program, _)| program)
            .collect();
        assert_eq!(programs, vec!["wslview", "cmd.exe", "powershell.exe"]);
    }

    #[test]
    fn test_every_launcher_receives_url() {
        for platform in [
            Platform::Windows,
            Platform::MacOs,
            Platform::Wsl,
            Platform::Linux,
        ] {
            for (program, args) in launchers(platform, URL) {
                assert!(
                    args.iter().any(|arg| arg.contains(URL)),
                    "{} does not receive the URL",
                    program
                );
            }
        }
        assert!(launchers(Platform::Other, URL).is_empty());
    }

    #[test]
    fn test_powershell_quotes_url() {
        let (_, args) = launchers(Platform::Wsl, "https://x/?a='b'")
            .into_iter()
            .find(|(program, _)| *program == "powershell.exe")
            .unwrap();
        assert_eq!(args[1], "Start-Process 'https://x/?a=''b'''");
    }

    // open_browser is not tested here because it opens a real browser
}
