use std::process::Command;

// Short git hash reported by `opaccuracy::version()`; left unset outside a repository.
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");

    let sha = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_default();

    if !sha.is_empty() {
        println!("cargo:rustc-env=OPACCURACY_GIT_SHA={}", sha);
    }
}
