use std::path::PathBuf;

#[macro_use]
extern crate build_cfg;

#[build_cfg_main]
fn main() {
	println!("cargo:rerun-if-changed=build.rs");

	if !build_cfg!(windows) {
		return;
	}

	println!("cargo:rerun-if-env-changed=KINECTSDK10_DIR");

	let sdk_path = PathBuf::from(std::env::var_os("KINECTSDK10_DIR").expect("KINECTSDK10_DIR not set"));

	println!(
		"cargo:rustc-link-search={}/lib/{}",
		sdk_path.display(),
		if build_cfg!(target_pointer_width = "64") {
			"amd64"
		} else if build_cfg!(target_pointer_width = "32") {
			"x86"
		} else {
			panic!("unsupported target_pointer_width")
		}
	);
}
