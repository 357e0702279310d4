//! Status lines on stdout, errors on stderr

use apkvc_core::VaultError;
use crossterm::style::Stylize;

pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", "•".dark_grey(), msg);
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

/// Indented `key: value` line.
pub fn detail(key: &str, value: &str) {
    println!("  {:<11} {}", format!("{key}:").dark_grey(), value);
}

/// Print a failed command. Vault errors lead with their kind string.
pub fn error(err: &anyhow::Error) {
    let message = match err.downcast_ref::<VaultError>() {
        Some(vault_err) => vault_err.public_message(),
        None => format!("{err:#}"),
    };
    eprintln!("{} {}", "✗".red(), message);
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;

    let b = bytes as f64;
    if b >= GIB {
        format!("{:.1} GB", b / GIB)
    } else if b >= MIB {
        format!("{:.1} MB", b / MIB)
    } else if b >= KIB {
        format!("{:.1} KB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}
