pub mod crawl;
pub mod report;

use colored::Colorize;

const BANNER: &str = r#"
            _ _                    _
 __ _____ _(_) |__ _ _ __ ___ __ _| |
 \ V / -_) | | / _| '_/ _` \ V  V / |
  \_/\___|_|_|_\__|_| \__,_|\_/\_/|_|
"#;

pub fn print_banner() {
    println!("{}", BANNER.bright_magenta().bold());
    println!(
        "  {} {}\n",
        "anonymous site snapshots over Tor".bright_black(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black()
    );
}
