//! Version command - show version information

use crate::filter::DEFAULT_ALLOWED_COMMANDS;

/// Print version information
///
/// If verbose is false, prints a single line with name and version.
/// If verbose is true, prints detailed build information.
pub fn print_version(verbose: bool) {
    println!("{} {}", crate::NAME, crate::VERSION);

    if verbose {
        println!();
        println!("Allowed commands: {}", DEFAULT_ALLOWED_COMMANDS.join(", "));
        println!();
        println!("Build info:");
        println!("  Target:    {}", std::env::consts::ARCH);
        println!("  OS:        {}", std::env::consts::OS);
        println!("  Rust:      {}", env!("RUSTC_VERSION"));
        if let Ok(exe) = std::env::current_exe() {
            println!("  Executable: {}", exe.display());
        }
    }
}
