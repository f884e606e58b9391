use dll_syringe::process::{OwnedProcess, OwnedProcessModule, Process};
use eyre::{Result, WrapErr};
use std::{
	ffi::OsStr,
	mem::size_of,
	os::windows::io::AsRawHandle,
	path::{Path, PathBuf},
	time::{Duration, SystemTime},
};
use windows::{
	Wdk::System::Threading::{NtQueryInformationProcess, ProcessBasicInformation},
	Win32::{
		Foundation::{BOOL, HANDLE, HMODULE, WAIT_FAILED},
		System::{
			ProcessStatus::GetModuleFileNameExA,
			SystemInformation::{GetNativeSystemInfo, PROCESSOR_ARCHITECTURE_INTEL, SYSTEM_INFO},
			Threading::{
				IsWow64Process, OpenProcess, WaitForSingleObject, INFINITE, PROCESS_ACCESS_RIGHTS, PROCESS_BASIC_INFORMATION,
				PROCESS_QUERY_LIMITED_INFORMATION,
			},
		},
	},
};

const MAX_PATH: usize = 32767;

struct Game {
	process: OwnedProcess,
	/// The module to inject, under `garrysmod/lua/bin/`.
	module: PathBuf,
	/// The game's root directory; the module drops its logs there.
	game_dir: PathBuf,
}

struct InjectedGame {
	process: OwnedProcessModule,
}

pub fn run() -> Result<()> {
	println!(concat!("motionlinker v", env!("CARGO_PKG_VERSION")));

	loop {
		println!("Waiting for the game to start...");

		let game = loop {
			match Game::find() {
				Some(game) => break game,
				None => std::thread::sleep(Duration::from_secs(5)),
			}
		};

		match game.process.pid() {
			Ok(pid) => println!("Found the game (pid {pid})"),
			Err(_) => println!("Found the game (pid unknown)"),
		}

		println!("Injecting gmcl_motionlink...");

		let game_dir = game.game_dir.clone();
		let game = match game.inject() {
			Ok(game) => game,
			Err(err) => {
				eprintln!("Failed to inject gmcl_motionlink: {err:?}");
				print_recent_logs(&game_dir);
				std::thread::sleep(Duration::from_secs(5));
				continue;
			}
		};

		println!("Injected successfully!");

		println!("Waiting for the game to close...");

		game.wait();
	}
}

/// Prints the module's log and any panic logs written in the last few
/// seconds, so injection failures aren't invisible.
fn print_recent_logs(game_dir: &Path) {
	let now = SystemTime::now();

	let is_recent = |path: PathBuf| {
		let modified = path.metadata().and_then(|metadata| metadata.modified()).ok()?;
		if now.duration_since(modified).is_ok_and(|elapsed| elapsed <= Duration::from_secs(10)) {
			Some(path)
		} else {
			None
		}
	};

	if let Some(logs) = is_recent(game_dir.join("gmcl_motionlink.log")).and_then(|path| std::fs::read_to_string(path).ok()) {
		println!("\n========= LOGS =========\n{logs}");
	}

	let panic_logs = game_dir.read_dir().into_iter().flat_map(|dir| {
		dir.filter_map(|entry| entry.ok())
			.map(|entry| entry.path())
			.filter(|path| {
				path.file_name()
					.and_then(OsStr::to_str)
					.is_some_and(|name| name.starts_with("gmcl_motionlink_panic_"))
					&& path.extension() == Some(OsStr::new("log"))
			})
			.filter_map(&is_recent)
			.filter_map(|path| std::fs::read_to_string(path).ok())
	});

	for log in panic_logs {
		println!("{log}\n");
	}
}

impl Game {
	fn find() -> Option<Self> {
		OwnedProcess::find_all_by_name("gmod.exe")
			.into_iter()
			.map(|process| (process, false))
			.chain(OwnedProcess::find_all_by_name("hl2.exe").into_iter().map(|process| (process, true)))
			.filter_map(|(process, is_hl2)| {
				let handle = HANDLE(process.as_raw_handle() as isize);

				unsafe {
					let mut exe_path = [0u8; MAX_PATH];
					let len = GetModuleFileNameExA(handle, HMODULE(0), &mut exe_path);
					if len == 0 {
						return None;
					}
					let exe_path = &exe_path[..len as usize];
					let exe_path = OsStr::from_encoded_bytes_unchecked(exe_path);
					let exe_path = Path::new(exe_path);

					if exe_path.extension() != Some(OsStr::new("exe")) {
						return None;
					}

					let exe = exe_path.file_name()?;

					let mut game_dir = exe_path.parent()?;

					if !is_hl2 {
						// gmod.exe is stored in bin/win64/
						game_dir = game_dir.parent().and_then(|dir| dir.parent())?;
					}

					let is_x86 = is_x86_process(handle).ok()?;

					// Skip crash handlers and other subprocesses the game spawns
					if !matches!(is_subprocess(handle, exe), Ok(false)) {
						return None;
					}

					let garrysmod_dir = game_dir.join("garrysmod");

					if garrysmod_dir.is_dir() {
						return Some(Game {
							process,
							module: garrysmod_dir
								.join("lua")
								.join("bin")
								.join(format!("gmcl_motionlink_win{}.dll", if is_x86 { "32" } else { "64" })),
							game_dir: game_dir.to_path_buf(),
						});
					}
				}

				None
			})
			.next()
	}

	fn inject(self) -> Result<InjectedGame> {
		println!("Waiting for Lua initialization...");
		while self
			.process
			.find_module_by_name("lua_shared")
			.wrap_err("Failed to look for lua_shared")?
			.is_none()
		{
			std::thread::sleep(Duration::from_secs(1));
		}

		dll_syringe::Syringe::for_process(self.process)
			.find_or_inject(&self.module)
			.wrap_err("Failed to inject the module")
			.and_then(|injected| injected.try_to_owned().wrap_err("Failed to keep a handle to the injected module"))
			.map(|process| InjectedGame { process })
	}
}

impl InjectedGame {
	fn wait(self) {
		let sync_res: Result<(), std::io::Error> = (|| unsafe {
			const SYNCHRONIZE: PROCESS_ACCESS_RIGHTS = PROCESS_ACCESS_RIGHTS(0x00100000);

			let sync = OpenProcess(SYNCHRONIZE, BOOL::from(false), self.process.process().pid()?.get() as _)?;

			if WaitForSingleObject(sync, INFINITE) == WAIT_FAILED {
				return Err(std::io::Error::last_os_error())?;
			}

			Ok(())
		})();

		drop(self);

		if let Err(err) = sync_res {
			eprintln!("Failed to wait for the game to close: {err:?}");
			println!("Press ENTER to continue...");
			std::io::stdin().read_line(&mut String::new()).ok();
		}
	}
}

fn is_x86_process(process: HANDLE) -> Result<bool, std::io::Error> {
	unsafe {
		let mut system_info: SYSTEM_INFO = core::mem::zeroed();
		GetNativeSystemInfo(&mut system_info);

		if system_info.Anonymous.Anonymous.wProcessorArchitecture == PROCESSOR_ARCHITECTURE_INTEL {
			// This computer is 32-bit
			return Ok(true);
		}

		let mut is_wow_64 = BOOL(0);
		IsWow64Process(process, &mut is_wow_64)?;
		Ok(is_wow_64 == BOOL(1))
	}
}

fn is_subprocess(process: HANDLE, process_name: &OsStr) -> Result<bool, std::io::Error> {
	Ok(unsafe {
		let mut info: PROCESS_BASIC_INFORMATION = core::mem::zeroed();
		NtQueryInformationProcess(
			process,
			ProcessBasicInformation,
			&mut info as *mut _ as *mut _,
			size_of::<PROCESS_BASIC_INFORMATION>() as _,
			core::ptr::null_mut(),
		)
		.ok()?;

		if info.InheritedFromUniqueProcessId == 0 {
			return Ok(false);
		}

		let parent = OpenProcess(
			PROCESS_QUERY_LIMITED_INFORMATION,
			BOOL::from(false),
			info.InheritedFromUniqueProcessId as _,
		)?;

		let mut exe_path = [0u8; MAX_PATH];
		let len = GetModuleFileNameExA(parent, HMODULE(0), &mut exe_path);
		if len == 0 {
			return Err(std::io::Error::last_os_error());
		}
		let exe_path = &exe_path[..len as usize];
		let exe_path = OsStr::from_encoded_bytes_unchecked(exe_path);
		let exe_path = Path::new(exe_path);
		let exe = match exe_path.file_name() {
			Some(exe) => exe,
			None => return Err(std::io::Error::new(std::io::ErrorKind::Other, "Failed to get parent executable name")),
		};

		exe == process_name
	})
}
