//! Support for loading without `require()`: when the DLL is injected into a
//! running game process, there is no Lua state to receive us yet, so we
//! detour `CLuaManager::Startup` in each realm's engine module and finish
//! initialization when that realm's Lua comes up.

use crate::{
	glua::{self, LuaRealm},
	logging,
};
#[cfg(all(target_os = "windows", target_pointer_width = "32"))]
use fn_abi::abi;
use std::{cell::Cell, ffi::c_void, path::Path};

#[derive(Clone, Copy, Debug)]
enum ModuleLuaState {
	Uninitialized,
	InjectedDll,
	BinaryModule(gmod::lua::State),
}

thread_local! {
	static LUA_STATE: Cell<ModuleLuaState> = Cell::new(ModuleLuaState::Uninitialized);
}

pub fn lua_state() -> Option<gmod::lua::State> {
	if let ModuleLuaState::BinaryModule(state) = LUA_STATE.get() {
		Some(state)
	} else {
		None
	}
}

pub fn binary_module_init(lua: gmod::lua::State) {
	if !matches!(LUA_STATE.get(), ModuleLuaState::InjectedDll) {
		LUA_STATE.set(ModuleLuaState::BinaryModule(lua));
	}
}

macro_rules! dll_paths {
	($($func:ident => $bin:literal / $linux_main_branch:literal),*) => {
		$(fn $func() -> &'static str {
			match () {
				_ if cfg!(all(windows, target_pointer_width = "64")) => concat!("bin/win64/", $bin, ".dll"),
				_ if cfg!(all(target_os = "linux", target_pointer_width = "64")) => concat!("bin/linux64/", $bin, ".so"),

				_ if cfg!(all(target_os = "macos")) => concat!("GarrysMod_Signed.app/Contents/MacOS/", $bin, ".dylib"),

				_ if cfg!(all(windows, target_pointer_width = "32")) => {
					let x86_64_branch = concat!("bin/", $bin, ".dll");
					if Path::new(x86_64_branch).exists() {
						x86_64_branch
					} else {
						concat!("garrysmod/bin/", $bin, ".dll")
					}
				},

				_ if cfg!(all(target_os = "linux", target_pointer_width = "32")) => {
					let x86_64_branch = concat!("bin/linux32/", $bin, ".so");
					if Path::new(x86_64_branch).exists() {
						x86_64_branch
					} else {
						concat!("garrysmod/bin/", $linux_main_branch, ".so")
					}
				},

				_ => panic!("Unsupported platform"),
			}
		})*
	};
}
dll_paths! {
	client_dll_path => "client"/"client",
	server_dll_path => "server"/"server",
	lua_shared_srv_dll_path => "lua_shared"/"lua_shared_srv",
	lua_shared_dll_path => "lua_shared"/"lua_shared"
}

#[cfg(windows)]
type LoadedLibrary = libloading::os::windows::Library;
#[cfg(unix)]
type LoadedLibrary = libloading::os::unix::Library;

/// Opens a handle to a module the game has already loaded, without loading
/// it a second time.
unsafe fn open_loaded_lib(path: &str) -> Result<LoadedLibrary, libloading::Error> {
	#[cfg(windows)]
	{
		LoadedLibrary::open_already_loaded(path)
	}
	#[cfg(unix)]
	{
		LoadedLibrary::open(Some(path), libc::RTLD_NOLOAD)
	}
}

unsafe fn open_loaded_lua_shared() -> Result<LoadedLibrary, libloading::Error> {
	#[cfg(windows)]
	{
		open_loaded_lib("lua_shared")
	}
	#[cfg(unix)]
	{
		open_loaded_lib("lua_shared_srv").or_else(|_| open_loaded_lib("lua_shared"))
	}
}

#[cfg_attr(all(target_os = "windows", target_pointer_width = "32"), abi("thiscall"))]
type CLuaManagerStartupFn = extern "C" fn(this: *mut c_void);

static mut SERVER_STARTUP_DETOUR: Option<gmod::detour::RawDetour> = None;
static mut CLIENT_STARTUP_DETOUR: Option<gmod::detour::RawDetour> = None;

#[cfg_attr(all(target_os = "windows", target_pointer_width = "32"), abi("thiscall"))]
unsafe extern "C" fn server_cluamanager_startup(this: *mut c_void) {
	let trampoline = core::mem::transmute::<_, CLuaManagerStartupFn>(SERVER_STARTUP_DETOUR.as_ref().unwrap().trampoline() as *const ());
	trampoline(this);
	cluamanager_startup(true);
}

#[cfg_attr(all(target_os = "windows", target_pointer_width = "32"), abi("thiscall"))]
unsafe extern "C" fn client_cluamanager_startup(this: *mut c_void) {
	let trampoline = core::mem::transmute::<_, CLuaManagerStartupFn>(CLIENT_STARTUP_DETOUR.as_ref().unwrap().trampoline() as *const ());
	trampoline(this);
	cluamanager_startup(false);
}

fn server_cluamanager_startup_sig() -> gmod::sigscan::Signature {
	// string search: "-withjit"
	match () {
		_ if cfg!(all(target_os = "windows", target_pointer_width = "64")) => gmod::sigscan::signature!("48 89 5C 24 ? 48 89 74 24 ? 57 48 81 EC ? ? ? ? 48 8B 05 ? ? ? ? 48 33 C4 48 89 84 24 ? ? ? ? 48 83 3D ? ? ? ? ? 48 8B F1 74 0D 48 8D 0D ? ? ? ? FF 15 ? ? ? ?"),
		_ if cfg!(all(target_os = "windows", target_pointer_width = "32")) => gmod::sigscan::signature!("55 8B EC 81 EC ? ? ? ? 83 3D ? ? ? ? ? 53 8B D9 74"),
		_ if cfg!(all(target_os = "linux", target_pointer_width = "64")) => gmod::sigscan::signature!("55 48 89 E5 41 56 41 55 41 54 53 48 89 FB 48 81 EC ? ? ? ? 64 48 8B 04 25 ? ? ? ? 48 89 45 D8 31 C0 4C 8B 2D ? ? ? ? 49 83 7D ? ? 74 0C 48 8D 3D ? ? ? ? E8 ? ? ? ?"),
		_ if cfg!(all(target_os = "linux", target_pointer_width = "32")) => gmod::sigscan::signature!("55 89 E5 57 56 53 81 EC ? ? ? ? 65 A1 ? ? ? ? 89 45 E4 31 C0 8B 15 ? ? ? ? 8B 5D 08 85 D2 74 0C C7 04 24 ? ? ? ? E8 ? ? ? ?"),
		_ => todo!("Unsupported platform"),
	}
}

fn client_cluamanager_startup_sig() -> gmod::sigscan::Signature {
	// string search: "Clientside Lua startup!"
	match () {
		_ if cfg!(all(target_pointer_width = "64", target_os = "windows")) => gmod::sigscan::signature!("48 89 5C 24 ? 48 89 74 24 ? 57 48 81 EC ? ? ? ? 48 8B 05 ? ? ? ? 48 33 C4 48 89 84 24 ? ? ? ? 48 8B F1 48 8D 0D ? ? ? ? FF 15 ? ? ? ? E8 ? ? ? ?"),
		_ if cfg!(all(target_pointer_width = "32", target_os = "windows")) => gmod::sigscan::signature!("55 8B EC 81 EC ? ? ? ? 53 68 ? ? ? ? 8B D9 FF 15 ? ? ? ? 83 C4 04 E8 ? ? ? ? D9 05 ? ? ? ? 68 ? ? ? ?"),
		_ if cfg!(all(target_pointer_width = "32", target_os = "linux")) => gmod::sigscan::signature!("55 89 E5 57 56 53 81 EC ? ? ? ? 65 A1 ? ? ? ? 89 45 E4 31 C0 C7 04 24 ? ? ? ?"),
		_ => todo!("Unsupported platform"),
	}
}

unsafe fn cluamanager_startup(srv: bool) {
	let lib_path = if srv { lua_shared_srv_dll_path() } else { lua_shared_dll_path() };

	let lib = open_loaded_lib(lib_path).expect("Failed to load lua_shared");

	let i_lua_shared = glua::get_lua_shared(
		*lib.get::<*const ()>(b"CreateInterface")
			.expect("Failed to find CreateInterface in lua_shared"),
	);

	if i_lua_shared.is_null() {
		panic!("Failed to get ILuaShared");
	}

	let c_lua_interface = glua::open_lua_interface(i_lua_shared, if srv { LuaRealm::Server } else { LuaRealm::Client });

	if c_lua_interface.is_null() {
		panic!("Failed to get CLuaInterface");
	}

	let lua_state = glua::get_lua_state(c_lua_interface);

	{
		static mut GMOD_RS_SET_LUA_STATE: bool = false;
		if !core::mem::replace(&mut GMOD_RS_SET_LUA_STATE, true) {
			gmod::set_lua_state(lua_state);
		}
	}

	crate::init(gmod::lua::State(lua_state));
}

pub unsafe fn init() {
	if is_ctor_binary_module() {
		// Loaded by require(); no need to hook CLuaManager::Startup
		return;
	}

	LUA_STATE.set(ModuleLuaState::InjectedDll);

	logging::init_for_injected_dll();

	log::info!("DLL injected");

	for (dll_path, sig, slot, detour) in [
		(
			server_dll_path(),
			server_cluamanager_startup_sig(),
			&mut SERVER_STARTUP_DETOUR,
			server_cluamanager_startup as *const (),
		),
		(
			client_dll_path(),
			client_cluamanager_startup_sig(),
			&mut CLIENT_STARTUP_DETOUR,
			client_cluamanager_startup as *const (),
		),
	] {
		log::info!("Hooking CLuaManager::Startup in {dll_path}");

		let target = sig.scan_module(dll_path).expect("Failed to find CLuaManager::Startup") as *const ();

		*slot = Some({
			let hook = gmod::detour::RawDetour::new(target, detour).expect("Failed to hook CLuaManager::Startup");
			hook.enable().expect("Failed to enable CLuaManager::Startup hook");
			hook
		});
	}
}

unsafe fn is_ctor_binary_module() -> bool {
	let lib = open_loaded_lua_shared().expect("Failed to find lua_shared");

	let i_lua_shared = glua::get_lua_shared(
		*lib.get::<*const ()>(b"CreateInterface")
			.expect("Failed to find CreateInterface in lua_shared"),
	);
	if i_lua_shared.is_null() {
		panic!("Failed to get ILuaShared");
	}

	let cl = glua::open_lua_interface(i_lua_shared, LuaRealm::Client);
	let sv = glua::open_lua_interface(i_lua_shared, LuaRealm::Server);

	// If neither realm has a live Lua interface yet, we got here before the
	// game booted Lua, which only happens when we were injected.
	!(cl.is_null() && sv.is_null())
}
