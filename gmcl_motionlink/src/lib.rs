#[macro_use]
extern crate gmod;

mod api;
mod cusercmd;
mod glua;
mod inject;
mod logging;
mod relay;

static mut GMOD13_OPEN: bool = false;

unsafe fn init(lua: gmod::lua::State) {
	log::info!(concat!("gmcl_motionlink v", env!("CARGO_PKG_VERSION"), " loaded!"));

	api::init(lua);
	relay::init(lua);
}

unsafe fn shutdown() {
	relay::shutdown();
}

#[gmod13_open]
unsafe fn gmod13_open(lua: gmod::lua::State) {
	set_panic_handler();

	let is_server;
	{
		lua.get_global(lua_string!("SERVER"));
		is_server = lua.get_boolean(-1);
		lua.pop();
	}

	// If we're on the server, don't do anything.
	if is_server {
		log::info!("gmcl_motionlink is a clientside module, and does nothing on the server.");
		return;
	}

	// If we're already injected, don't do anything.
	if relay::already_initialized() {
		return;
	}

	GMOD13_OPEN = true;

	logging::init_for_binary_module();
	inject::binary_module_init(lua);
	init(lua);
}

#[gmod13_close]
unsafe fn gmod13_close(_lua: gmod::lua::State) {
	if GMOD13_OPEN {
		shutdown();
	}
}

// Support for DLL injecting
#[cfg(not(test))]
#[ctor::ctor]
fn ctor() {
	set_panic_handler();

	// If we're already injected, don't do anything.
	if unsafe { relay::already_initialized() } {
		return;
	}

	unsafe { inject::init() };
}

fn set_panic_handler() {
	std::panic::set_hook(Box::new(move |panic| {
		if let Some(lua) = inject::lua_state() {
			unsafe {
				lua.get_global(lua_string!("ErrorNoHalt"));
				if !lua.is_nil(-1) {
					lua.push_string(&format!("gmcl_motionlink panic: {:#?}\n", panic));
					lua.call(1, 0);
				} else {
					lua.pop();
				}
			}
		} else {
			std::fs::write(format!("gmcl_motionlink_panic_{}.log", std::process::id()), format!("{:#?}", panic)).ok();
		}
	}));
}
