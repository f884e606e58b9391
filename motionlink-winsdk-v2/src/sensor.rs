use crate::ffi::{self, IBody, IBodyFrame, IBodyFrameReader, IBodyFrameSource, ICoordinateMapper, IKinectSensor, IIsAvailableChangedEventArgs, WaitableHandle, BODY_COUNT, JOINT_TYPE_COUNT};
use motionlink::slots::{SlotChange, SlotStates};
use std::{
	ffi::c_void,
	ops::{Add, Div},
	ptr,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};
use windows::{
	core::HRESULT,
	Win32::{
		Foundation::{E_FAIL, HANDLE, WAIT_OBJECT_0},
		System::Threading::INFINITE,
		UI::WindowsAndMessaging::{DispatchMessageW, MsgWaitForMultipleObjects, PeekMessageW, TranslateMessage, MSG, PM_REMOVE, QS_ALLINPUT, WM_QUIT},
	},
};

pub type KinectV2Callback = extern "C" fn(KinectV2BodyUpdate, *mut c_void);

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Vector3 {
	pub x: f32,
	pub y: f32,
	pub z: f32,
}
impl Add for Vector3 {
	type Output = Self;

	#[inline(always)]
	fn add(self, rhs: Self) -> Self::Output {
		Self {
			x: self.x + rhs.x,
			y: self.y + rhs.y,
			z: self.z + rhs.z,
		}
	}
}
impl Div<f32> for Vector3 {
	type Output = Self;

	#[inline(always)]
	fn div(self, rhs: f32) -> Self::Output {
		Self {
			x: self.x / rhs,
			y: self.y / rhs,
			z: self.z / rhs,
		}
	}
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union SensorJoints {
	pub raw: [Vector3; JOINT_TYPE_COUNT],
	pub named: NamedSensorJoints,
}

/// JointType enum order from Kinect.h.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NamedSensorJoints {
	pub spine_base: Vector3,
	pub spine_mid: Vector3,
	pub neck: Vector3,
	pub head: Vector3,
	pub shoulder_left: Vector3,
	pub elbow_left: Vector3,
	pub wrist_left: Vector3,
	pub hand_left: Vector3,
	pub shoulder_right: Vector3,
	pub elbow_right: Vector3,
	pub wrist_right: Vector3,
	pub hand_right: Vector3,
	pub hip_left: Vector3,
	pub knee_left: Vector3,
	pub ankle_left: Vector3,
	pub foot_left: Vector3,
	pub hip_right: Vector3,
	pub knee_right: Vector3,
	pub ankle_right: Vector3,
	pub foot_right: Vector3,
	pub spine_shoulder: Vector3,
	pub hand_tip_left: Vector3,
	pub thumb_left: Vector3,
	pub hand_tip_right: Vector3,
	pub thumb_right: Vector3,
}

/// One per-slot observation. `joints` is null when the body is no longer
/// tracked, and only valid for the duration of the callback invocation.
#[repr(C)]
pub struct KinectV2BodyUpdate {
	pub body_index: usize,
	pub joints: *const SensorJoints,
}
impl KinectV2BodyUpdate {
	#[inline]
	fn lost(body_index: usize) -> Self {
		Self {
			body_index,
			joints: ptr::null(),
		}
	}

	#[inline]
	pub fn joints(&self) -> Option<&SensorJoints> {
		if !self.joints.is_null() {
			Some(unsafe { &*self.joints })
		} else {
			None
		}
	}
}

pub struct KinectV2Sensor {
	callback: KinectV2Callback,
	userdata: *mut c_void,

	sensor: *mut IKinectSensor,
	coordinate_mapper: *mut ICoordinateMapper,
	body_frame_reader: *mut IBodyFrameReader,

	body_frame_arrived_event: WaitableHandle,
	available_changed_event: WaitableHandle,

	slots: SlotStates<BODY_COUNT>,
	available: Arc<AtomicBool>,
}

impl KinectV2Sensor {
	/// Allocates the wrapper and opens the default sensor. The caller must
	/// check the `HRESULT` before running it.
	pub fn create(callback: KinectV2Callback, userdata: *mut c_void) -> (*mut KinectV2Sensor, HRESULT) {
		let sensor = Box::into_raw(Box::new(Self {
			callback,
			userdata,
			sensor: ptr::null_mut(),
			coordinate_mapper: ptr::null_mut(),
			body_frame_reader: ptr::null_mut(),
			body_frame_arrived_event: 0,
			available_changed_event: 0,
			slots: SlotStates::new(),
			available: Arc::new(AtomicBool::new(false)),
		}));

		let hr = unsafe { (*sensor).initialize_default_sensor() };

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

	fn initialize_default_sensor(&mut self) -> HRESULT {
		let mut hr = unsafe { ffi::GetDefaultKinectSensor(&mut self.sensor) };
		if hr.is_err() {
			return hr;
		}

		if self.sensor.is_null() {
			return E_FAIL;
		}

		let sensor = unsafe { &mut *self.sensor };

		// The default sensor always exists; only adopt it if the runtime
		// reports the hardware as actually present.
		let mut available = 0u8;
		hr = unsafe { sensor.get_is_available(&mut available) };
		if hr.is_ok() && available == 0 {
			hr = E_FAIL;
		}

		if hr.is_ok() {
			hr = unsafe { sensor.open() };
		}

		if hr.is_ok() {
			hr = unsafe { sensor.get_coordinate_mapper(&mut self.coordinate_mapper) };
		}

		let mut body_frame_source: *mut IBodyFrameSource = ptr::null_mut();

		if hr.is_ok() {
			hr = unsafe { sensor.get_body_frame_source(&mut body_frame_source) };
		}

		if hr.is_ok() {
			hr = unsafe { (*body_frame_source).open_reader(&mut self.body_frame_reader) };
		}

		if !body_frame_source.is_null() {
			unsafe { (*body_frame_source).release() };
		}

		if hr.is_ok() {
			hr = unsafe { (*self.body_frame_reader).subscribe_frame_arrived(&mut self.body_frame_arrived_event) };
		}

		if hr.is_ok() {
			hr = unsafe { sensor.subscribe_is_available_changed(&mut self.available_changed_event) };
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
			let events = [
				HANDLE(self.body_frame_arrived_event as isize),
				HANDLE(self.available_changed_event as isize),
			];

			let fired = unsafe { MsgWaitForMultipleObjects(Some(&events), false, INFINITE, QS_ALLINPUT) };
			match fired.0.wrapping_sub(WAIT_OBJECT_0.0) {
				0 => self.body_frame_arrived(),
				1 => self.available_changed(),
				_ => {}
			}

			while unsafe { PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE) }.as_bool() {
				unsafe {
					TranslateMessage(&msg);
					DispatchMessageW(&msg);
				}
			}
		}
	}

	fn body_frame_arrived(&mut self) {
		if self.body_frame_reader.is_null() {
			return;
		}

		// Always the newest buffered frame; stale frames are dropped, and
		// "no frame ready" is nothing to do this tick.
		let mut frame: *mut IBodyFrame = ptr::null_mut();
		if unsafe { (*self.body_frame_reader).acquire_latest_frame(&mut frame) }.is_err() {
			return;
		}

		let mut bodies: [*mut IBody; BODY_COUNT] = [ptr::null_mut(); BODY_COUNT];

		if unsafe { (*frame).get_and_refresh_body_data(BODY_COUNT as u32, bodies.as_mut_ptr()) }.is_ok() {
			self.process_body(&bodies);
		}

		for body in bodies {
			if !body.is_null() {
				unsafe { (*body).release() };
			}
		}

		unsafe { (*frame).release() };
	}

	fn process_body(&mut self, bodies: &[*mut IBody; BODY_COUNT]) {
		if self.coordinate_mapper.is_null() {
			return;
		}

		for (i, &body) in bodies.iter().enumerate() {
			if body.is_null() {
				continue;
			}

			let mut tracked = 0u8;
			let hr = unsafe { (*body).get_is_tracked(&mut tracked) };
			let tracked = hr.is_ok() && tracked != 0;

			match self.slots.observe(i, tracked) {
				SlotChange::Update => {
					let mut joints: [ffi::Joint; JOINT_TYPE_COUNT] = unsafe { std::mem::zeroed() };
					if unsafe { (*body).get_joints(JOINT_TYPE_COUNT as u32, joints.as_mut_ptr()) }.is_ok() {
						let mut skeleton = SensorJoints {
							raw: [Vector3::default(); JOINT_TYPE_COUNT],
						};

						for (dst, joint) in unsafe { skeleton.raw.iter_mut() }.zip(joints.iter()) {
							*dst = Vector3 {
								x: joint.position.x,
								y: joint.position.y,
								z: joint.position.z,
							};
						}

						(self.callback)(
							KinectV2BodyUpdate {
								body_index: i,
								joints: &skeleton,
							},
							self.userdata,
						);
					}
				}

				SlotChange::Lost => (self.callback)(KinectV2BodyUpdate::lost(i), self.userdata),

				SlotChange::Idle => {}
			}
		}
	}

	fn available_changed(&mut self) {
		let mut available = false;

		let mut args: *mut IIsAvailableChangedEventArgs = ptr::null_mut();
		if unsafe { (*self.sensor).get_is_available_changed_event_data(self.available_changed_event, &mut args) }.is_ok() && !args.is_null() {
			let mut flag = 0u8;
			if unsafe { (*args).get_is_available(&mut flag) }.is_ok() {
				available = flag != 0;
			}
			unsafe { (*args).release() };
		}

		self.available.store(available, Ordering::Release);

		if !available {
			let (callback, userdata) = (self.callback, self.userdata);
			for slot in self.slots.drain_engaged() {
				callback(KinectV2BodyUpdate::lost(slot), userdata);
			}
		}

		// The runtime does not re-arm the availability waitable after
		// delivering an event; re-subscribe for the next one.
		unsafe {
			(*self.sensor).unsubscribe_is_available_changed(self.available_changed_event);
			self.available_changed_event = 0;
			(*self.sensor).subscribe_is_available_changed(&mut self.available_changed_event);
		}
	}
}

impl Drop for KinectV2Sensor {
	fn drop(&mut self) {
		if !self.body_frame_reader.is_null() {
			unsafe {
				if self.body_frame_arrived_event != 0 {
					(*self.body_frame_reader).unsubscribe_frame_arrived(self.body_frame_arrived_event);
				}
				(*self.body_frame_reader).release();
			}
		}

		if !self.coordinate_mapper.is_null() {
			unsafe { (*self.coordinate_mapper).release() };
		}

		if !self.sensor.is_null() {
			unsafe {
				if self.available_changed_event != 0 {
					(*self.sensor).unsubscribe_is_available_changed(self.available_changed_event);
				}
				(*self.sensor).close();
				(*self.sensor).release();
			}
		}
	}
}
