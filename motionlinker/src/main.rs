#[cfg(windows)]
mod windows;

#[cfg(windows)]
fn main() -> eyre::Result<()> {
	windows::run()
}

#[cfg(not(windows))]
fn main() {
	eprintln!("motionlinker only supports Windows");
	std::process::exit(1);
}
