//! In-place writes into the engine's `CUserCmd` through the userdata the
//! `StartCommand` hook hands us.

use crate::relay;
use motionlink::{SkeletonRawBones, SKELETON_BONE_COUNT};
use std::ffi::c_void;

/// Lua userdata: a tagged, untyped pointer to the wrapped engine object.
#[repr(C)]
struct UserData {
	data: *mut c_void,
	type_id: u8,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct QAngle {
	x: f32,
	y: f32,
	z: f32,
}

/// Engine layout, x86-64 branch. There is no tag to check against; if the
/// engine reorders this struct, the writes below corrupt memory silently.
#[repr(C)]
struct CUserCmd {
	command_number: i32,
	tick_count: i32,
	viewangles: QAngle,
	forwardmove: f32,
	sidemove: f32,
	upmove: f32,
	buttons: i32,
	impulse: u8,
	weaponselect: i32,
	weaponsubtype: i32,
	random_seed: i32,
	server_random_seed: i32,
	mousedx: i16,
	mousedy: i16,
	hasbeenpredicted: bool,
	buttons_pressed: [u8; 5],
	world_clicking: bool,
	world_click_direction: [f32; 2],
	is_typing: bool,
	motion_sensor_positions: [[f32; 3]; SKELETON_BONE_COUNT],
	forced: bool,
}

pub unsafe fn set_motion_sensor_positions(lua_cusercmd: *mut c_void, positions: &[[f32; 3]; SKELETON_BONE_COUNT]) {
	let cusercmd = (*(lua_cusercmd as *mut UserData)).data as *mut CUserCmd;
	(*cusercmd).motion_sensor_positions = *positions;
}

#[lua_function]
unsafe fn start_command(lua: gmod::lua::State) {
	let cusercmd = lua.to_userdata(2);

	if let Some(relay) = relay::state() {
		if let Some(skeleton) = &relay.skeleton {
			set_motion_sensor_positions(cusercmd, skeleton);
			return;
		}
	}

	set_motion_sensor_positions(cusercmd, &SkeletonRawBones::default());
}

pub unsafe fn hook(lua: gmod::lua::State) {
	lua.get_global(lua_string!("hook"));
	lua.get_field(-1, lua_string!("Add"));
	lua.push_string("StartCommand");
	lua.push_string("gmcl_motionlink");
	lua.push_function(start_command);
	lua.call(3, 0);
	lua.pop();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn writes_twenty_vectors_index_for_index() {
		let mut cmd: CUserCmd = unsafe { std::mem::zeroed() };
		cmd.command_number = 42;
		cmd.tick_count = 7;

		let mut userdata = UserData {
			data: &mut cmd as *mut CUserCmd as *mut c_void,
			type_id: 0,
		};

		// Flat 60-float input buffer, vector k = floats [3k, 3k+1, 3k+2]
		let mut flat = [0.0f32; SKELETON_BONE_COUNT * 3];
		for (i, f) in flat.iter_mut().enumerate() {
			*f = i as f32 + 0.25;
		}

		let mut positions = SkeletonRawBones::default();
		for (k, pos) in positions.iter_mut().enumerate() {
			*pos = [flat[k * 3], flat[k * 3 + 1], flat[k * 3 + 2]];
		}

		let lua_cusercmd = &mut userdata as *mut UserData as *mut c_void;
		unsafe { set_motion_sensor_positions(lua_cusercmd, &positions) };

		for k in 0..SKELETON_BONE_COUNT {
			assert_eq!(cmd.motion_sensor_positions[k], [flat[k * 3], flat[k * 3 + 1], flat[k * 3 + 2]]);
		}

		// Neighboring fields are untouched
		assert_eq!(cmd.command_number, 42);
		assert_eq!(cmd.tick_count, 7);
		assert!(!cmd.is_typing);
		assert!(!cmd.forced);

		// Reapplying the same buffer is idempotent
		unsafe { set_motion_sensor_positions(lua_cusercmd, &positions) };
		for k in 0..SKELETON_BONE_COUNT {
			assert_eq!(cmd.motion_sensor_positions[k], [flat[k * 3], flat[k * 3 + 1], flat[k * 3 + 2]]);
		}
	}
}
