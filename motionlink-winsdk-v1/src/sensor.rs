use crate::ffi::{self, INuiSensor, NuiSkeletonFrame, NuiSkeletonTrackingState, NUI_SKELETON_COUNT, NUI_SKELETON_POSITION_COUNT};
use motionlink::slots::{SlotChange, SlotStates};
use std::{
	ffi::c_void,
	mem::MaybeUninit,
	ptr,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};
use windows::{
	core::HRESULT,
	Win32::{
		Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0},
		System::Threading::{CreateEventW, INFINITE},
		UI::WindowsAndMessaging::{DispatchMessageW, MsgWaitForMultipleObjects, PeekMessageW, TranslateMessage, MSG, PM_REMOVE, QS_ALLINPUT, WM_QUIT},
	},
};

pub type KinectV1Callback = extern "C" fn(KinectV1SkeletonUpdate, *mut c_void);

/// One per-slot observation. The pointers inside [`SkeletonPos`] reference
/// the frame being processed and are only valid for the duration of the
/// callback invocation; callers must copy what they need.
#[repr(C)]
pub struct KinectV1SkeletonUpdate {
	pub skeleton_index: usize,
	pub state: NuiSkeletonTrackingState,
	pub pos: MaybeUninit<SkeletonPos>,
}
impl KinectV1SkeletonUpdate {
	#[inline]
	fn lost(skeleton_index: usize) -> Self {
		Self {
			skeleton_index,
			state: NuiSkeletonTrackingState::NotTracked,
			pos: MaybeUninit::uninit(),
		}
	}

	#[inline]
	pub fn pos(&self) -> Option<KinectV1Skeleton> {
		match self.state {
			NuiSkeletonTrackingState::NotTracked => None,
			NuiSkeletonTrackingState::PositionOnly => Some(KinectV1Skeleton::PositionOnly(unsafe { self.pos.assume_init_ref().position_only })),
			NuiSkeletonTrackingState::Tracked => Some(KinectV1Skeleton::Tracked(unsafe { self.pos.assume_init_ref().tracked })),
		}
	}
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union SkeletonPos {
	pub position_only: SkeletonPositionOnly,
	pub tracked: SkeletonTracked,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct SkeletonPositionOnly {
	pub position: *const ffi::Vector4,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct SkeletonTracked {
	pub position: *const ffi::Vector4,
	pub bones: *const [ffi::Vector4; NUI_SKELETON_POSITION_COUNT],
}

#[derive(Clone, Copy)]
pub enum KinectV1Skeleton {
	PositionOnly(SkeletonPositionOnly),
	Tracked(SkeletonTracked),
}

pub struct KinectV1Sensor {
	callback: KinectV1Callback,
	userdata: *mut c_void,

	sensor: *mut INuiSensor,
	next_skeleton_event: HANDLE,

	slots: SlotStates<NUI_SKELETON_COUNT>,
	available: Arc<AtomicBool>,
}

impl KinectV1Sensor {
	/// Allocates the wrapper and acquires the first connected sensor. The
	/// wrapper is always returned (the device-status callback needs a stable
	/// address); the caller must check the `HRESULT` before running it.
	pub fn create(callback: KinectV1Callback, userdata: *mut c_void) -> (*mut KinectV1Sensor, HRESULT) {
		let sensor = Box::into_raw(Box::new(Self {
			callback,
			userdata,
			sensor: ptr::null_mut(),
			next_skeleton_event: HANDLE::default(),
			slots: SlotStates::new(),
			available: Arc::new(AtomicBool::new(false)),
		}));

		let hr = unsafe { (*sensor).monitor_sensors() };

		(sensor, hr)
	}

	#[inline]
	pub fn userdata(&self) -> *mut c_void {
		self.userdata
	}

	#[inline]
	pub fn availability(&self) -> Arc<AtomicBool> {
		self.available.clone()
	}

	#[inline]
	pub fn is_available(&self) -> bool {
		self.available.load(Ordering::Acquire)
	}

	fn monitor_sensors(&mut self) -> HRESULT {
		// Manual-reset event, signaled by the runtime when skeleton data is ready
		self.next_skeleton_event = match unsafe { CreateEventW(None, true, false, None) } {
			Ok(event) => event,
			Err(err) => return err.code(),
		};

		unsafe { ffi::NuiSetDeviceStatusCallback(Some(device_status_changed), self as *mut Self as *mut c_void) };

		let mut sensor_count = 0;
		let hr = unsafe { ffi::NuiGetSensorCount(&mut sensor_count) };
		if hr.is_err() {
			return hr;
		}

		for i in 0..sensor_count {
			let mut sensor: *mut INuiSensor = ptr::null_mut();
			if unsafe { ffi::NuiCreateSensorByIndex(i, &mut sensor) }.is_err() {
				continue;
			}

			if unsafe { (*sensor).status() } == HRESULT(0) {
				self.sensor = sensor;
				break;
			}

			// This sensor wasn't OK, so release it since we're not using it
			unsafe { (*sensor).release() };
		}

		if self.sensor.is_null() {
			return ffi::E_NUI_NOTCONNECTED;
		}

		let mut hr = unsafe { (*self.sensor).initialize(ffi::NUI_INITIALIZE_FLAG_USES_SKELETON) };

		if hr.is_ok() {
			hr = unsafe { (*self.sensor).skeleton_tracking_enable(self.next_skeleton_event, 0) };
		}

		if hr.is_ok() {
			self.available.store(true, Ordering::Release);
		}

		hr
	}

	/// Blocks until a `WM_QUIT` message is posted to this thread.
	pub fn run(&mut self) {
		let mut msg = MSG::default();

		while msg.message != WM_QUIT {
			let events = [self.next_skeleton_event];

			// MsgWaitForMultipleObjects also wakes for queued input, so the
			// fired index has to be checked explicitly.
			let fired = unsafe { MsgWaitForMultipleObjects(Some(&events), false, INFINITE, QS_ALLINPUT) };
			if fired == WAIT_OBJECT_0 {
				self.process_skeleton();
			}

			// The runtime delivers device-status callbacks through the
			// thread's message queue.
			while unsafe { PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE) }.as_bool() {
				unsafe {
					TranslateMessage(&msg);
					DispatchMessageW(&msg);
				}
			}
		}
	}

	fn process_skeleton(&mut self) {
		if self.sensor.is_null() {
			return;
		}

		let mut frame: NuiSkeletonFrame = unsafe { std::mem::zeroed() };
		if unsafe { (*self.sensor).skeleton_get_next_frame(0, &mut frame) }.is_err() {
			// No frame ready this tick
			return;
		}

		unsafe { (*self.sensor).transform_smooth(&mut frame, ptr::null()) };

		for i in 0..NUI_SKELETON_COUNT {
			let data = &frame.skeleton_data[i];
			let engaged = data.tracking_state != NuiSkeletonTrackingState::NotTracked;

			match self.slots.observe(i, engaged) {
				SlotChange::Update => {
					let pos = match data.tracking_state {
						NuiSkeletonTrackingState::Tracked => SkeletonPos {
							tracked: SkeletonTracked {
								position: &data.position,
								bones: &data.skeleton_positions,
							},
						},
						_ => SkeletonPos {
							position_only: SkeletonPositionOnly { position: &data.position },
						},
					};

					(self.callback)(
						KinectV1SkeletonUpdate {
							skeleton_index: i,
							state: data.tracking_state,
							pos: MaybeUninit::new(pos),
						},
						self.userdata,
					);
				}

				SlotChange::Lost => (self.callback)(KinectV1SkeletonUpdate::lost(i), self.userdata),

				SlotChange::Idle => {}
			}
		}
	}

	fn device_status_changed(&mut self, hr_status: HRESULT, instance_name: *const u16) {
		if !self.sensor.is_null() {
			unsafe {
				(*self.sensor).shutdown();
				(*self.sensor).release();
			}
			self.sensor = ptr::null_mut();
			self.available.store(false, Ordering::Release);

			let (callback, userdata) = (self.callback, self.userdata);
			for slot in self.slots.drain_engaged() {
				callback(KinectV1SkeletonUpdate::lost(slot), userdata);
			}
		}

		if hr_status.is_ok() {
			let mut sensor: *mut INuiSensor = ptr::null_mut();
			if unsafe { ffi::NuiCreateSensorById(instance_name, &mut sensor) }.is_err() {
				return;
			}

			let mut hr = unsafe { (*sensor).status() };

			if hr.is_ok() {
				hr = unsafe { (*sensor).initialize(ffi::NUI_INITIALIZE_FLAG_USES_SKELETON) };
			}

			if hr.is_ok() {
				hr = unsafe { (*sensor).skeleton_tracking_enable(self.next_skeleton_event, 0) };
			}

			if hr.is_ok() {
				self.sensor = sensor;
				self.available.store(true, Ordering::Release);
			} else {
				unsafe { (*sensor).release() };
			}
		}
	}
}

impl Drop for KinectV1Sensor {
	fn drop(&mut self) {
		// The runtime would otherwise keep delivering status callbacks to a
		// freed wrapper.
		unsafe { ffi::NuiSetDeviceStatusCallback(None, ptr::null_mut()) };

		if !self.sensor.is_null() {
			unsafe {
				(*self.sensor).shutdown();
				(*self.sensor).release();
			}
		}

		if !self.next_skeleton_event.is_invalid() {
			unsafe { CloseHandle(self.next_skeleton_event) }.ok();
		}
	}
}

extern "system" fn device_status_changed(hr_status: HRESULT, instance_name: *const u16, _unique_device_name: *const u16, user_data: *mut c_void) {
	let sensor = unsafe { &mut *(user_data as *mut KinectV1Sensor) };
	sensor.device_status_changed(hr_status, instance_name);
}
