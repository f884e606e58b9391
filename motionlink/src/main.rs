fn main() -> Result<(), std::io::Error> {
	env_logger::builder().filter_level(log::LevelFilter::Info).init();

	#[cfg(windows)]
	{
		use std::sync::{
			atomic::{AtomicBool, Ordering},
			Arc,
		};

		let running = Arc::new(AtomicBool::new(true));
		{
			let running = running.clone();
			ctrlc::set_handler(move || running.store(false, Ordering::SeqCst)).expect("Failed to set Ctrl-C handler");
		}

		let mut motion = motionlink::Motion::new()?;
		let mut available = motion.available();
		log::info!("sensor available: {available}");

		while running.load(Ordering::SeqCst) {
			if let Some(update) = motion.poll() {
				println!("{:#?}", update);
			}

			let now_available = motion.available();
			if core::mem::replace(&mut available, now_available) != now_available {
				log::info!("sensor available: {now_available}");
			}

			std::thread::sleep(std::time::Duration::from_millis(1));
		}
	}

	Ok(())
}
