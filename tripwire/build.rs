use std::{env, fs, path::Path, path::PathBuf, process::Command};

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let out_file = out_dir.join("tripwire");

    println!("cargo:rerun-if-changed=../tripwire-ebpf/src");
    println!("cargo:rerun-if-changed=../tripwire-ebpf/build.rs");
    println!("cargo:rerun-if-changed=../tripwire-common/src");
    println!("cargo:rerun-if-env-changed=TRIPWIRE_SKIP_EBPF");

    if env::var_os("TRIPWIRE_SKIP_EBPF").is_some() {
        write_empty_object(&out_file, "TRIPWIRE_SKIP_EBPF is set");
        return;
    }

    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap();

    let bpf_target = match arch.as_str() {
        "x86_64" | "x86" | "aarch64" | "arm" | "riscv64" => "bpfel-unknown-none",
        "mips" | "mips64" | "powerpc" | "powerpc64" | "s390x" => "bpfeb-unknown-none",
        _ => {
            eprintln!(
                "Warning: Unknown architecture '{}', defaulting to bpfel-unknown-none",
                arch
            );
            "bpfel-unknown-none"
        }
    };

    println!(
        "cargo:warning=Building eBPF for target: {} (host arch: {})",
        bpf_target, arch
    );

    let ebpf_dir = PathBuf::from("../tripwire-ebpf");

    // Use a separate target directory for eBPF to avoid file lock conflicts
    let ebpf_target_dir = env::var("HOME")
        .map(|home| PathBuf::from(home).join("cargo-target-ebpf"))
        .unwrap_or_else(|_| out_dir.join("ebpf-target"));

    let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());

    let status = Command::new(cargo)
        .current_dir(&ebpf_dir)
        .env("RUSTUP_TOOLCHAIN", "nightly")
        .env("CARGO_TARGET_DIR", &ebpf_target_dir)
        // Host flags must not leak into the BPF build.
        .env_remove("CARGO_ENCODED_RUSTFLAGS")
        .env_remove("RUSTFLAGS")
        .args([
            "build",
            "--release",
            &format!("--target={}", bpf_target),
            "-Z",
            "build-std=core",
        ])
        .stdout(std::process::Stdio::inherit())
        .stderr(std::process::Stdio::inherit())
        .status();

    match status {
        Ok(status) if status.success() => {
            let ebpf_binary = ebpf_target_dir.join(format!("{}/release/tripwire", bpf_target));
            fs::copy(&ebpf_binary, &out_file).expect("Failed to copy eBPF object file");
            println!("cargo:warning=eBPF object embedded from {}", ebpf_binary.display());
        }
        Ok(status) => write_empty_object(&out_file, &format!("eBPF build exited with {status}")),
        Err(e) => write_empty_object(&out_file, &format!("failed to run cargo: {e}")),
    }
}

/// The loader rejects an empty object at startup with an explicit error.
fn write_empty_object(out_file: &Path, reason: &str) {
    println!(
        "cargo:warning=eBPF object not built ({}); the tripwire binary will refuse to start",
        reason
    );
    fs::write(out_file, b"").expect("Failed to write placeholder eBPF object");
}
