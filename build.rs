use std::process::Command;

fn main() {
    // Git commit hash（短）
    let commit = git_output(&["rev-parse", "--short", "HEAD"]);

    // 构建时间（UTC）
    let build_time = Command::new("date")
        .args(["-u", "+%Y-%m-%dT%H:%M:%SZ"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let target = std::env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=NOVELSITE_GIT_COMMIT={commit}");
    println!("cargo:rustc-env=NOVELSITE_BUILD_TIME={build_time}");
    println!("cargo:rustc-env=NOVELSITE_BUILD_TARGET={target}");
    println!("cargo:rustc-env=NOVELSITE_BUILD_PROFILE={profile}");

    // 内置模板变化时重新编译
    println!("cargo:rerun-if-changed=defaults/");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
}

fn git_output(args: &[&str]) -> String {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
