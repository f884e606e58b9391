//! Raw bridge into the game's Lua-hosting interface.
//!
//! Everything in this module mirrors undocumented, version-specific engine
//! layouts (the x86-64 branch at the time of writing). None of it is
//! validated at runtime; a layout mismatch here is silent memory corruption,
//! so this module must stay the only place that dereferences engine objects.

#[cfg(all(target_os = "windows", target_pointer_width = "32"))]
use fn_abi::abi;
use std::ffi::{c_char, c_int, c_void};

pub const LUA_SHARED_INTERFACE: &[u8; 13] = b"LUASHARED003\0";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum LuaRealm {
	Client = 0,
	Server = 1,
	Menu = 2,
}

/// Interface factory exported by every engine module.
pub type CreateInterfaceFn = unsafe extern "C" fn(name: *const c_char, return_code: *mut c_int) -> *mut c_void;

/// `ILuaShared` vtable: dtor, `Init`, `Shutdown`, `DumpStats`,
/// `CreateLuaInterface`, `CloseLuaInterface`, `GetLuaInterface`. The Itanium
/// ABI spends two slots on the virtual destructor where MSVC spends one.
const GET_LUA_INTERFACE_SLOT: usize = if cfg!(windows) { 6 } else { 7 };

#[cfg_attr(all(target_os = "windows", target_pointer_width = "32"), abi("thiscall"))]
type GetLuaInterfaceFn = extern "C" fn(this: *mut c_void, realm: u8) -> *mut c_void;

/// `CLuaInterface` prefix: the vptr, then the raw `lua_State*`.
#[repr(C)]
struct CLuaInterface {
	vtable: *const c_void,
	lua: *mut c_void,
}

/// Calls the factory with the Lua-sharing interface name. Returns whatever
/// the factory returns, unchecked — null if the host renamed the interface.
pub unsafe fn get_lua_shared(create_interface: *const ()) -> *mut c_void {
	let create_interface = core::mem::transmute::<_, CreateInterfaceFn>(create_interface);
	create_interface(LUA_SHARED_INTERFACE.as_ptr() as *const c_char, core::ptr::null_mut())
}

/// Reads slot `index` of the virtual table addressed by the first machine
/// word of `object`. No bounds check; indexing past the real table is
/// undefined behavior.
pub unsafe fn lookup_vtable(object: *const c_void, index: usize) -> *const c_void {
	let vtable = *(object as *const *const *const c_void);
	*vtable.add(index)
}

/// `ILuaShared::GetLuaInterface(realm)`. Null when that realm's Lua isn't up.
pub unsafe fn open_lua_interface(i_lua_shared: *mut c_void, realm: LuaRealm) -> *mut c_void {
	let get_lua_interface = core::mem::transmute::<_, GetLuaInterfaceFn>(lookup_vtable(i_lua_shared, GET_LUA_INTERFACE_SLOT));
	get_lua_interface(i_lua_shared, realm as u8)
}

pub unsafe fn get_lua_state(c_lua_interface: *mut c_void) -> *mut c_void {
	(*(c_lua_interface as *const CLuaInterface)).lua
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[test]
	fn lookup_vtable_reads_slot_by_index() {
		let vtable: [*const c_void; 8] = core::array::from_fn(|i| (0x1000 + i * 0x10) as *const c_void);
		let vptr = vtable.as_ptr() as *const c_void;
		let object = &vptr as *const *const c_void as *const c_void;

		for (i, slot) in vtable.iter().enumerate() {
			assert_eq!(unsafe { lookup_vtable(object, i) }, *slot);
		}
	}

	#[test]
	fn get_lua_state_reads_field_past_vptr() {
		let iface = CLuaInterface {
			vtable: 0xDEAD_usize as *const c_void,
			lua: 0xBEEF_usize as *mut c_void,
		};

		assert_eq!(
			unsafe { get_lua_state(&iface as *const CLuaInterface as *mut c_void) },
			0xBEEF_usize as *mut c_void
		);
	}

	#[test]
	fn get_lua_shared_requests_the_pinned_interface_version() {
		static SENTINEL: u8 = 0;

		unsafe extern "C" fn fake_create_interface(name: *const c_char, return_code: *mut c_int) -> *mut c_void {
			assert!(return_code.is_null());
			if std::ffi::CStr::from_ptr(name).to_bytes() == b"LUASHARED003" {
				&SENTINEL as *const u8 as *mut c_void
			} else {
				core::ptr::null_mut()
			}
		}

		let shared = unsafe { get_lua_shared(fake_create_interface as *const ()) };
		assert_eq!(shared, &SENTINEL as *const u8 as *mut c_void);
	}

	#[cfg(not(all(target_os = "windows", target_pointer_width = "32")))]
	#[test]
	fn open_lua_interface_calls_through_the_fixed_slot() {
		static CALLED_WITH_THIS: AtomicUsize = AtomicUsize::new(0);

		extern "C" fn fake_get_lua_interface(this: *mut c_void, realm: u8) -> *mut c_void {
			CALLED_WITH_THIS.store(this as usize, Ordering::SeqCst);
			(realm as usize + 1) as *mut c_void
		}

		let mut vtable = [core::ptr::null::<c_void>(); 8];
		vtable[GET_LUA_INTERFACE_SLOT] = fake_get_lua_interface as *const c_void;

		let vptr = vtable.as_ptr() as *const c_void;
		let object = &vptr as *const *const c_void as *mut c_void;

		let iface = unsafe { open_lua_interface(object, LuaRealm::Server) };
		assert_eq!(iface, (LuaRealm::Server as usize + 1) as *mut c_void);
		assert_eq!(CALLED_WITH_THIS.load(Ordering::SeqCst), object as usize);
	}
}
