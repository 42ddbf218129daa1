//! Host-side gates that run before a session touches the socket: the
//! Wi-Fi association check and the device reachability probe. Both
//! shell out to OS tools, so they run on the blocking pool.

use log::debug;
use std::net::IpAddr;
use std::process::Command;

/// SSID the host is currently associated with, if any.
///
/// Tries `iwgetid` first and falls back to `nmcli` on Linux; uses the
/// platform tool elsewhere. Returns `None` when no tool is available or
/// the host is not associated.
pub fn current_ssid() -> Option<String> {
    platform_ssid().filter(|ssid| !ssid.is_empty())
}

#[cfg(target_os = "linux")]
fn platform_ssid() -> Option<String> {
    if let Ok(output) = Command::new("iwgetid").arg("-r").output() {
        if output.status.success() {
            let ssid = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !ssid.is_empty() {
                return Some(ssid);
            }
        }
    }
    let output = Command::new("nmcli")
        .args(["-t", "-f", "active,ssid", "dev", "wifi"])
        .output()
        .ok()?;
    ssid_from_nmcli(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(target_os = "macos")]
fn platform_ssid() -> Option<String> {
    let output = Command::new("networksetup")
        .args(["-getairportnetwork", "en0"])
        .output()
        .ok()?;
    String::from_utf8_lossy(&output.stdout)
        .split_once(':')
        .map(|(_, ssid)| ssid.trim().to_string())
}

#[cfg(target_os = "windows")]
fn platform_ssid() -> Option<String> {
    let output = Command::new("netsh")
        .args(["wlan", "show", "interfaces"])
        .output()
        .ok()?;
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .find_map(|line| {
            let line = line.trim();
            line.starts_with("SSID")
                .then(|| line.split_once(':'))
                .flatten()
                .map(|(_, ssid)| ssid.trim().to_string())
        })
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn platform_ssid() -> Option<String> {
    None
}

/// `nmcli -t -f active,ssid dev wifi` prints one `active:ssid` line per
/// visible network; the associated one is flagged `yes`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn ssid_from_nmcli(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.strip_prefix("yes:")
            .map(|ssid| ssid.trim().to_string())
    })
}

/// Whether the host answers a single ping within a second.
pub fn ping_once(addr: IpAddr) -> bool {
    let target = addr.to_string();
    #[cfg(target_os = "windows")]
    let args = ["-n", "1", "-w", "1000", target.as_str()];
    #[cfg(not(target_os = "windows"))]
    let args = ["-c", "1", "-W", "1", target.as_str()];

    match Command::new("ping").args(args).output() {
        Ok(output) => ping_succeeded(output.status.success(), &String::from_utf8_lossy(&output.stdout)),
        Err(err) => {
            debug!("ping {target} failed to spawn: {err}");
            false
        }
    }
}

/// Some ping builds exit zero on 100% loss; require a reply in the
/// transcript as well.
fn ping_succeeded(exit_ok: bool, stdout: &str) -> bool {
    exit_ok && !stdout.contains("100% packet loss") && !stdout.contains("100.0% packet loss")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nmcli_output_picks_the_active_network() {
        let output = "no:Neighbors\nyes:HomeLab\nno:Guest\n";
        assert_eq!(ssid_from_nmcli(output), Some("HomeLab".to_string()));
        assert_eq!(ssid_from_nmcli("no:Neighbors\n"), None);
        assert_eq!(ssid_from_nmcli(""), None);
    }

    #[test]
    fn total_loss_is_not_a_successful_probe() {
        let lossy = "1 packets transmitted, 0 received, 100% packet loss, time 0ms";
        assert!(!ping_succeeded(true, lossy));

        let healthy = "1 packets transmitted, 1 received, 0% packet loss, time 0ms";
        assert!(ping_succeeded(true, healthy));
        assert!(!ping_succeeded(false, healthy));
    }
}
