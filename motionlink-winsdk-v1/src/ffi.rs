//! Hand-declared subset of the Kinect for Windows SDK v1 API (NuiApi.h,
//! SDK 1.8, kinect10.dll).
//!
//! Struct layouts and the `INuiSensor` vtable order mirror the installed
//! SDK headers byte-for-byte. Nothing here is checked at runtime; a
//! mismatched SDK version is undefined behavior, not an error.

use std::ffi::{c_int, c_void};
use windows::{core::HRESULT, Win32::Foundation::HANDLE};

pub const NUI_SKELETON_COUNT: usize = 6;
pub const NUI_SKELETON_POSITION_COUNT: usize = 20;

pub const NUI_INITIALIZE_FLAG_USES_SKELETON: u32 = 0x0000_0008;

pub const E_NUI_NOTCONNECTED: HRESULT = HRESULT(0x8301_0014_u32 as i32);

pub type NuiStatusProc =
	extern "system" fn(hr_status: HRESULT, instance_name: *const u16, unique_device_name: *const u16, user_data: *mut c_void);

#[link(name = "kinect10")]
extern "system" {
	pub fn NuiGetSensorCount(count: *mut c_int) -> HRESULT;
	pub fn NuiCreateSensorByIndex(index: c_int, sensor: *mut *mut INuiSensor) -> HRESULT;
	pub fn NuiCreateSensorById(instance_id: *const u16, sensor: *mut *mut INuiSensor) -> HRESULT;
	pub fn NuiSetDeviceStatusCallback(callback: Option<NuiStatusProc>, user_data: *mut c_void);
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector4 {
	pub x: f32,
	pub y: f32,
	pub z: f32,
	pub w: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(dead_code)]
pub enum NuiSkeletonTrackingState {
	NotTracked = 0,
	PositionOnly = 1,
	Tracked = 2,
}

#[repr(C)]
pub struct NuiSkeletonData {
	pub tracking_state: NuiSkeletonTrackingState,
	pub tracking_id: u32,
	pub enrollment_index: u32,
	pub user_index: u32,
	pub position: Vector4,
	pub skeleton_positions: [Vector4; NUI_SKELETON_POSITION_COUNT],
	pub skeleton_position_tracking_state: [i32; NUI_SKELETON_POSITION_COUNT],
	pub quality_flags: u32,
}

#[repr(C)]
pub struct NuiSkeletonFrame {
	pub time_stamp: i64,
	pub frame_number: u32,
	pub flags: u32,
	pub floor_clip_plane: Vector4,
	pub normal_to_gravity: Vector4,
	pub skeleton_data: [NuiSkeletonData; NUI_SKELETON_COUNT],
}

#[repr(C)]
pub struct INuiSensor {
	vtable: *const INuiSensorVtbl,
}

type UnusedSlot = *const c_void;

/// NuiSensor.h declaration order. Only the methods this crate calls are
/// typed; everything else is an opaque slot holding the table's layout.
#[repr(C)]
pub struct INuiSensorVtbl {
	// IUnknown
	query_interface: UnusedSlot,
	add_ref: UnusedSlot,
	release: extern "system" fn(this: *mut INuiSensor) -> u32,

	// INuiSensor
	nui_initialize: extern "system" fn(this: *mut INuiSensor, flags: u32) -> HRESULT,
	nui_shutdown: extern "system" fn(this: *mut INuiSensor),
	nui_set_frame_end_event: UnusedSlot,
	nui_image_stream_open: UnusedSlot,
	nui_image_stream_set_image_frame_flags: UnusedSlot,
	nui_image_stream_get_image_frame_flags: UnusedSlot,
	nui_image_stream_get_next_frame: UnusedSlot,
	nui_image_stream_release_frame: UnusedSlot,
	nui_image_get_color_pixel_coordinates_from_depth_pixel: UnusedSlot,
	nui_image_get_color_pixel_coordinates_from_depth_pixel_at_resolution: UnusedSlot,
	nui_image_get_color_pixel_coordinate_frame_from_depth_pixel_frame_at_resolution: UnusedSlot,
	nui_camera_elevation_set_angle: UnusedSlot,
	nui_camera_elevation_get_angle: UnusedSlot,
	nui_skeleton_tracking_enable: extern "system" fn(this: *mut INuiSensor, next_frame_event: HANDLE, flags: u32) -> HRESULT,
	nui_skeleton_tracking_disable: UnusedSlot,
	nui_skeleton_set_tracked_skeletons: UnusedSlot,
	nui_skeleton_get_next_frame: extern "system" fn(this: *mut INuiSensor, milliseconds_to_wait: u32, frame: *mut NuiSkeletonFrame) -> HRESULT,
	nui_transform_smooth: extern "system" fn(this: *mut INuiSensor, frame: *mut NuiSkeletonFrame, params: *const c_void) -> HRESULT,
	nui_get_audio_source: UnusedSlot,
	nui_instance_index: UnusedSlot,
	nui_device_connection_id: UnusedSlot,
	nui_unique_id: UnusedSlot,
	nui_audio_array_id: UnusedSlot,
	nui_status: extern "system" fn(this: *mut INuiSensor) -> HRESULT,
	nui_initialization_flags: UnusedSlot,
}

impl INuiSensor {
	#[inline]
	pub unsafe fn initialize(&mut self, flags: u32) -> HRESULT {
		((*self.vtable).nui_initialize)(self, flags)
	}

	#[inline]
	pub unsafe fn shutdown(&mut self) {
		((*self.vtable).nui_shutdown)(self)
	}

	#[inline]
	pub unsafe fn status(&mut self) -> HRESULT {
		((*self.vtable).nui_status)(self)
	}

	#[inline]
	pub unsafe fn skeleton_tracking_enable(&mut self, next_frame_event: HANDLE, flags: u32) -> HRESULT {
		((*self.vtable).nui_skeleton_tracking_enable)(self, next_frame_event, flags)
	}

	#[inline]
	pub unsafe fn skeleton_get_next_frame(&mut self, milliseconds_to_wait: u32, frame: *mut NuiSkeletonFrame) -> HRESULT {
		((*self.vtable).nui_skeleton_get_next_frame)(self, milliseconds_to_wait, frame)
	}

	/// `params` null selects the SDK's default temporal smoothing.
	#[inline]
	pub unsafe fn transform_smooth(&mut self, frame: *mut NuiSkeletonFrame, params: *const c_void) -> HRESULT {
		((*self.vtable).nui_transform_smooth)(self, frame, params)
	}

	#[inline]
	pub unsafe fn release(&mut self) -> u32 {
		((*self.vtable).release)(self)
	}
}
