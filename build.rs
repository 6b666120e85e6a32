use std::process::Command;

fn main() {
    let git_hash = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .unwrap_or_default();

    println!("cargo:rustc-env=GIT_HASH={}", git_hash.trim());
}
