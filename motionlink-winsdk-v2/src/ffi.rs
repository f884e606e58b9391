//! Hand-declared subset of the Kinect for Windows SDK v2 API (Kinect.h,
//! SDK 2.0, kinect20.dll).
//!
//! Vtable orders mirror the MIDL-generated header. Truncated vtables stop
//! after the last method this crate calls; nothing past a declared slot is
//! ever read. A mismatched SDK version is undefined behavior, not an error.

use std::ffi::c_void;
use windows::core::HRESULT;

pub const BODY_COUNT: usize = 6;
pub const JOINT_TYPE_COUNT: usize = 25;

/// Kinect.h: `typedef UINT64 WAITABLE_HANDLE;` — cast to a `HANDLE` for
/// wait calls.
pub type WaitableHandle = u64;

#[link(name = "kinect20")]
extern "system" {
	pub fn GetDefaultKinectSensor(sensor: *mut *mut IKinectSensor) -> HRESULT;
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct CameraSpacePoint {
	pub x: f32,
	pub y: f32,
	pub z: f32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Joint {
	pub joint_type: i32,
	pub position: CameraSpacePoint,
	pub tracking_state: i32,
}

type UnusedSlot = *const c_void;

#[repr(C)]
struct IUnknownVtbl {
	query_interface: UnusedSlot,
	add_ref: UnusedSlot,
	release: extern "system" fn(this: *mut c_void) -> u32,
}

macro_rules! com_release {
	($interface:ty) => {
		impl $interface {
			#[inline]
			pub unsafe fn release(&mut self) -> u32 {
				((*(self.vtable as *const IUnknownVtbl)).release)(self as *mut _ as *mut c_void)
			}
		}
	};
}

#[repr(C)]
pub struct IKinectSensor {
	vtable: *const IKinectSensorVtbl,
}
com_release!(IKinectSensor);

#[repr(C)]
struct IKinectSensorVtbl {
	query_interface: UnusedSlot,
	add_ref: UnusedSlot,
	release: UnusedSlot,

	subscribe_is_available_changed: extern "system" fn(this: *mut IKinectSensor, waitable_handle: *mut WaitableHandle) -> HRESULT,
	unsubscribe_is_available_changed: extern "system" fn(this: *mut IKinectSensor, waitable_handle: WaitableHandle) -> HRESULT,
	get_is_available_changed_event_data:
		extern "system" fn(this: *mut IKinectSensor, waitable_handle: WaitableHandle, event_data: *mut *mut IIsAvailableChangedEventArgs) -> HRESULT,
	open: extern "system" fn(this: *mut IKinectSensor) -> HRESULT,
	close: extern "system" fn(this: *mut IKinectSensor) -> HRESULT,
	get_is_open: UnusedSlot,
	get_is_available: extern "system" fn(this: *mut IKinectSensor, available: *mut u8) -> HRESULT,
	get_coordinate_mapper: extern "system" fn(this: *mut IKinectSensor, coordinate_mapper: *mut *mut ICoordinateMapper) -> HRESULT,
	get_color_frame_source: UnusedSlot,
	get_depth_frame_source: UnusedSlot,
	get_body_frame_source: extern "system" fn(this: *mut IKinectSensor, body_frame_source: *mut *mut IBodyFrameSource) -> HRESULT,
}

impl IKinectSensor {
	#[inline]
	pub unsafe fn subscribe_is_available_changed(&mut self, waitable_handle: *mut WaitableHandle) -> HRESULT {
		((*self.vtable).subscribe_is_available_changed)(self, waitable_handle)
	}

	#[inline]
	pub unsafe fn unsubscribe_is_available_changed(&mut self, waitable_handle: WaitableHandle) -> HRESULT {
		((*self.vtable).unsubscribe_is_available_changed)(self, waitable_handle)
	}

	#[inline]
	pub unsafe fn get_is_available_changed_event_data(
		&mut self,
		waitable_handle: WaitableHandle,
		event_data: *mut *mut IIsAvailableChangedEventArgs,
	) -> HRESULT {
		((*self.vtable).get_is_available_changed_event_data)(self, waitable_handle, event_data)
	}

	#[inline]
	pub unsafe fn open(&mut self) -> HRESULT {
		((*self.vtable).open)(self)
	}

	#[inline]
	pub unsafe fn close(&mut self) -> HRESULT {
		((*self.vtable).close)(self)
	}

	#[inline]
	pub unsafe fn get_is_available(&mut self, available: *mut u8) -> HRESULT {
		((*self.vtable).get_is_available)(self, available)
	}

	#[inline]
	pub unsafe fn get_coordinate_mapper(&mut self, coordinate_mapper: *mut *mut ICoordinateMapper) -> HRESULT {
		((*self.vtable).get_coordinate_mapper)(self, coordinate_mapper)
	}

	#[inline]
	pub unsafe fn get_body_frame_source(&mut self, body_frame_source: *mut *mut IBodyFrameSource) -> HRESULT {
		((*self.vtable).get_body_frame_source)(self, body_frame_source)
	}
}

#[repr(C)]
pub struct IIsAvailableChangedEventArgs {
	vtable: *const IIsAvailableChangedEventArgsVtbl,
}
com_release!(IIsAvailableChangedEventArgs);

#[repr(C)]
struct IIsAvailableChangedEventArgsVtbl {
	query_interface: UnusedSlot,
	add_ref: UnusedSlot,
	release: UnusedSlot,

	get_is_available: extern "system" fn(this: *mut IIsAvailableChangedEventArgs, available: *mut u8) -> HRESULT,
}

impl IIsAvailableChangedEventArgs {
	#[inline]
	pub unsafe fn get_is_available(&mut self, available: *mut u8) -> HRESULT {
		((*self.vtable).get_is_available)(self, available)
	}
}

#[repr(C)]
pub struct ICoordinateMapper {
	vtable: *const c_void,
}
com_release!(ICoordinateMapper);

#[repr(C)]
pub struct IBodyFrameSource {
	vtable: *const IBodyFrameSourceVtbl,
}
com_release!(IBodyFrameSource);

#[repr(C)]
struct IBodyFrameSourceVtbl {
	query_interface: UnusedSlot,
	add_ref: UnusedSlot,
	release: UnusedSlot,

	subscribe_frame_captured: UnusedSlot,
	unsubscribe_frame_captured: UnusedSlot,
	get_frame_captured_event_data: UnusedSlot,
	get_is_active: UnusedSlot,
	get_body_count: UnusedSlot,
	open_reader: extern "system" fn(this: *mut IBodyFrameSource, reader: *mut *mut IBodyFrameReader) -> HRESULT,
}

impl IBodyFrameSource {
	#[inline]
	pub unsafe fn open_reader(&mut self, reader: *mut *mut IBodyFrameReader) -> HRESULT {
		((*self.vtable).open_reader)(self, reader)
	}
}

#[repr(C)]
pub struct IBodyFrameReader {
	vtable: *const IBodyFrameReaderVtbl,
}
com_release!(IBodyFrameReader);

#[repr(C)]
struct IBodyFrameReaderVtbl {
	query_interface: UnusedSlot,
	add_ref: UnusedSlot,
	release: UnusedSlot,

	subscribe_frame_arrived: extern "system" fn(this: *mut IBodyFrameReader, waitable_handle: *mut WaitableHandle) -> HRESULT,
	unsubscribe_frame_arrived: extern "system" fn(this: *mut IBodyFrameReader, waitable_handle: WaitableHandle) -> HRESULT,
	get_frame_arrived_event_data: UnusedSlot,
	acquire_latest_frame: extern "system" fn(this: *mut IBodyFrameReader, frame: *mut *mut IBodyFrame) -> HRESULT,
}

impl IBodyFrameReader {
	#[inline]
	pub unsafe fn subscribe_frame_arrived(&mut self, waitable_handle: *mut WaitableHandle) -> HRESULT {
		((*self.vtable).subscribe_frame_arrived)(self, waitable_handle)
	}

	#[inline]
	pub unsafe fn unsubscribe_frame_arrived(&mut self, waitable_handle: WaitableHandle) -> HRESULT {
		((*self.vtable).unsubscribe_frame_arrived)(self, waitable_handle)
	}

	#[inline]
	pub unsafe fn acquire_latest_frame(&mut self, frame: *mut *mut IBodyFrame) -> HRESULT {
		((*self.vtable).acquire_latest_frame)(self, frame)
	}
}

#[repr(C)]
pub struct IBodyFrame {
	vtable: *const IBodyFrameVtbl,
}
com_release!(IBodyFrame);

#[repr(C)]
struct IBodyFrameVtbl {
	query_interface: UnusedSlot,
	add_ref: UnusedSlot,
	release: UnusedSlot,

	get_and_refresh_body_data: extern "system" fn(this: *mut IBodyFrame, capacity: u32, bodies: *mut *mut IBody) -> HRESULT,
}

impl IBodyFrame {
	#[inline]
	pub unsafe fn get_and_refresh_body_data(&mut self, capacity: u32, bodies: *mut *mut IBody) -> HRESULT {
		((*self.vtable).get_and_refresh_body_data)(self, capacity, bodies)
	}
}

#[repr(C)]
pub struct IBody {
	vtable: *const IBodyVtbl,
}
com_release!(IBody);

#[repr(C)]
struct IBodyVtbl {
	query_interface: UnusedSlot,
	add_ref: UnusedSlot,
	release: UnusedSlot,

	get_joints: extern "system" fn(this: *mut IBody, capacity: u32, joints: *mut Joint) -> HRESULT,
	get_joint_orientations: UnusedSlot,
	get_engaged: UnusedSlot,
	get_expression_detection_results: UnusedSlot,
	get_activity_detection_results: UnusedSlot,
	get_appearance_detection_results: UnusedSlot,
	get_hand_left_confidence: UnusedSlot,
	get_hand_left_state: UnusedSlot,
	get_hand_right_confidence: UnusedSlot,
	get_hand_right_state: UnusedSlot,
	get_clipped_edges: UnusedSlot,
	get_tracking_id: UnusedSlot,
	get_is_tracked: extern "system" fn(this: *mut IBody, tracked: *mut u8) -> HRESULT,
}

impl IBody {
	#[inline]
	pub unsafe fn get_joints(&mut self, capacity: u32, joints: *mut Joint) -> HRESULT {
		((*self.vtable).get_joints)(self, capacity, joints)
	}

	#[inline]
	pub unsafe fn get_is_tracked(&mut self, tracked: *mut u8) -> HRESULT {
		((*self.vtable).get_is_tracked)(self, tracked)
	}
}
