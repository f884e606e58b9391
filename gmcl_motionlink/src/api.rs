use crate::{cusercmd, relay};
use motionlink::SKELETON_BONE_COUNT;

#[lua_function]
unsafe fn start(_lua: gmod::lua::State) -> i32 {
	if let Some(relay) = relay::state() {
		relay.set_active(true);
	}

	1
}

#[lua_function]
unsafe fn stop(_lua: gmod::lua::State) -> i32 {
	if let Some(relay) = relay::state() {
		relay.set_active(false);
	}

	0
}

#[lua_function]
unsafe fn is_active(lua: gmod::lua::State) -> i32 {
	lua.push_boolean(relay::state().map(|relay| relay.active()).unwrap_or(false));

	1
}

#[lua_function]
unsafe fn is_available(lua: gmod::lua::State) -> i32 {
	lua.push_boolean(relay::state().is_some());
	1
}

#[lua_function]
unsafe fn get_table(lua: gmod::lua::State) -> i32 {
	lua.create_table(SKELETON_BONE_COUNT as _, 0);

	if let Some(relay) = relay::state() {
		relay.update();

		if let Some(skeleton) = &relay.skeleton {
			lua.get_global(lua_string!("Vector"));

			for (i, pos) in skeleton.iter().enumerate() {
				lua.push_value(-1);
				lua.push_number(pos[0] as _);
				lua.push_number(pos[1] as _);
				lua.push_number(pos[2] as _);
				lua.call(3, 1);
				lua.raw_seti(-3, i as _);
			}

			lua.pop();

			return 1;
		}
	}

	// Nothing tracked; fill the table with zeroed vectors
	lua.get_global(lua_string!("vector_origin"));
	for i in 0..SKELETON_BONE_COUNT as i32 {
		lua.push_value(-1);
		lua.raw_seti(-3, i);
	}
	lua.pop();

	1
}

#[lua_function]
unsafe fn player_motion_sensor_pos(lua: gmod::lua::State) -> i32 {
	let pos = if let Some(relay) = relay::state() {
		relay.update();

		if let Some(skeleton) = &relay.skeleton {
			usize::try_from(lua.to_integer(2)).ok().and_then(|idx| skeleton.get(idx)).copied()
		} else {
			None
		}
	} else {
		None
	};

	lua.get_global(lua_string!("Vector"));
	if let Some(pos) = pos {
		lua.push_number(pos[0] as _);
		lua.push_number(pos[1] as _);
		lua.push_number(pos[2] as _);
	} else {
		lua.push_integer(0);
		lua.push_integer(0);
		lua.push_integer(0);
	}
	lua.call(3, 1);

	1
}

#[lua_function]
unsafe fn get_colour_material(lua: gmod::lua::State) -> i32 {
	lua.get_global(lua_string!("Material"));
	lua.push_string("pp/colour");
	lua.call(1, 1);
	1
}

pub unsafe fn init(lua: gmod::lua::State) {
	{
		lua.get_global(lua_string!("motionsensor"));
		if lua.is_nil(-1) {
			lua.create_table(0, 0);
			lua.set_global(lua_string!("motionsensor"));
			lua.get_global(lua_string!("motionsensor"));
		}

		lua.push_string("Start");
		lua.push_function(start);
		lua.set_table(-3);

		lua.push_string("Stop");
		lua.push_function(stop);
		lua.set_table(-3);

		lua.push_string("IsActive");
		lua.push_function(is_active);
		lua.set_table(-3);

		lua.push_string("IsAvailable");
		lua.push_function(is_available);
		lua.set_table(-3);

		lua.push_string("GetTable");
		lua.push_function(get_table);
		lua.set_table(-3);

		lua.push_string("GetColourMaterial");
		lua.push_function(get_colour_material);
		lua.set_table(-3);

		lua.pop();
	}

	{
		lua.get_global(lua_string!("FindMetaTable"));
		lua.push_string("Player");
		lua.call(1, 1);

		if !lua.is_nil(-1) {
			lua.push_string("MotionSensorPos");
			lua.push_function(player_motion_sensor_pos);
			lua.set_table(-3);
		}

		lua.pop();
	}

	lua.get_global(lua_string!("CLIENT"));
	if !lua.is_nil(-1) {
		cusercmd::hook(lua);
	}
	lua.pop();
}
