#![cfg(windows)]

pub mod ffi;
mod sensor;

pub use sensor::{KinectV2BodyUpdate, KinectV2Callback, KinectV2Sensor, NamedSensorJoints, SensorJoints, Vector3};

use motionlink::{MotionBackend, MotionSkeleton, SkeletonBones, TrackedSkeleton};
use std::{
	ffi::c_void,
	marker::PhantomData,
	mem::ManuallyDrop,
	os::windows::io::AsRawHandle,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};
use windows::{
	core::HRESULT,
	Win32::{
		Foundation::{HANDLE, LPARAM, WPARAM},
		System::Threading::GetThreadId,
		UI::WindowsAndMessaging::{PostThreadMessageW, WM_QUIT},
	},
};

#[inline]
fn convert_camera_space_to_game(vector: Vector3) -> [f32; 3] {
	[-vector.x, vector.z, vector.y]
}

impl Vector3 {
	#[inline]
	fn into_game(self) -> [f32; 3] {
		convert_camera_space_to_game(self)
	}
}

pub type KinectV2TypedCallback<U> = extern "C" fn(KinectV2BodyUpdate, &mut U);

struct SendPtr<T>(*mut T);
unsafe impl<T> Send for SendPtr<T> {}
unsafe impl<T> Sync for SendPtr<T> {}

/// Owns the device thread; dropping posts `WM_QUIT` to it and joins.
pub struct KinectV2<U> {
	thread: ManuallyDrop<std::thread::JoinHandle<()>>,
	available: Arc<AtomicBool>,
	_userdata: PhantomData<U>,
}
impl<U> KinectV2<U> {
	#[inline]
	pub fn new(callback: KinectV2TypedCallback<U>, userdata: U) -> Result<Self, std::io::Error> {
		Self::new_(
			unsafe { core::mem::transmute::<_, KinectV2Callback>(callback) },
			Box::into_raw(Box::new(userdata)) as *mut c_void,
		)
	}

	fn new_(callback: KinectV2Callback, userdata: *mut c_void) -> Result<Self, std::io::Error> {
		let (sensor, hr) = KinectV2Sensor::create(callback, userdata);
		if hr.is_err() {
			unsafe { drop(Box::from_raw(sensor)) };
			unsafe { drop(Box::from_raw(userdata as *mut U)) };
			return Err(std::io::Error::new(
				std::io::ErrorKind::Other,
				format!("KinectV2Sensor::create() failed ({hr:?})"),
			));
		}

		let available = unsafe { (*sensor).availability() };

		Ok(Self {
			thread: ManuallyDrop::new({
				let sensor = SendPtr(sensor);
				let userdata = SendPtr(userdata as *mut U);
				std::thread::Builder::new()
					.name("motionlink_winsdk_v2".to_string())
					.spawn(move || unsafe {
						let sensor = { sensor };
						let sensor = sensor.0;
						(*sensor).run();
						drop(Box::from_raw(sensor));

						let userdata = { userdata };
						drop(Box::from_raw(userdata.0));
					})
					.unwrap()
			}),

			available,
			_userdata: PhantomData,
		})
	}

	#[inline]
	pub fn available(&self) -> bool {
		self.available.load(Ordering::Acquire)
	}
}
impl<U> Drop for KinectV2<U> {
	fn drop(&mut self) {
		let thread = unsafe { ManuallyDrop::take(&mut self.thread) };
		unsafe {
			PostThreadMessageW(GetThreadId(HANDLE(thread.as_raw_handle() as isize)), WM_QUIT, WPARAM(0), LPARAM(0)).ok();
		}
		thread.join().ok();
	}
}

#[no_mangle]
pub extern "Rust" fn gmcl_motionlink_init(logger: &'static dyn log::Log) -> Result<Box<dyn MotionBackend>, std::io::Error> {
	log::set_logger(logger).ok();
	log::set_max_level(log::LevelFilter::Info);

	struct BodyFrameEvent {
		slot: usize,
		joints: Option<SensorJoints>,
	}

	extern "C" fn callback(event: KinectV2BodyUpdate, tx: &mut std::sync::mpsc::SyncSender<BodyFrameEvent>) {
		// The joints pointer dies when this callback returns, so the array
		// is copied out before the event crosses the channel.
		tx.send(BodyFrameEvent {
			slot: event.body_index,
			joints: event.joints().copied(),
		})
		.ok();
	}

	let (tx, rx) = std::sync::mpsc::sync_channel(1);
	let kinect = KinectV2::new(callback, tx)?;

	struct WinSdkV2Backend {
		rx: std::sync::mpsc::Receiver<BodyFrameEvent>,
		skeleton: Option<usize>,
		inner: KinectV2<std::sync::mpsc::SyncSender<BodyFrameEvent>>,
	}
	impl MotionBackend for WinSdkV2Backend {
		fn poll(&mut self) -> Option<MotionSkeleton> {
			let event = self.rx.try_recv().ok()?;
			if self.skeleton.is_none() || self.skeleton == Some(event.slot) {
				if let Some(joints) = event.joints {
					self.skeleton = Some(event.slot);

					let joints = unsafe { &joints.named };

					return Some(MotionSkeleton::Tracked(TrackedSkeleton::from_named_bones(SkeletonBones {
						spine: joints.spine_mid.into_game(),
						hip_center: ((joints.hip_left + joints.hip_right) / 2.0).into_game(),
						shoulder_center: ((joints.shoulder_left + joints.shoulder_right) / 2.0).into_game(),

						head: joints.head.into_game(),
						shoulder_left: joints.shoulder_left.into_game(),
						elbow_left: joints.elbow_left.into_game(),
						wrist_left: joints.wrist_left.into_game(),
						hand_left: joints.hand_left.into_game(),
						shoulder_right: joints.shoulder_right.into_game(),
						elbow_right: joints.elbow_right.into_game(),
						wrist_right: joints.wrist_right.into_game(),
						hand_right: joints.hand_right.into_game(),
						hip_left: joints.hip_left.into_game(),
						knee_left: joints.knee_left.into_game(),
						ankle_left: joints.ankle_left.into_game(),
						foot_left: joints.foot_left.into_game(),
						hip_right: joints.hip_right.into_game(),
						knee_right: joints.knee_right.into_game(),
						ankle_right: joints.ankle_right.into_game(),
						foot_right: joints.foot_right.into_game(),
					})));
				} else if self.skeleton.is_some() {
					self.skeleton = None;
					return Some(MotionSkeleton::Untracked);
				}
			}
			None
		}

		fn available(&self) -> bool {
			self.inner.available()
		}
	}

	Ok(Box::new(WinSdkV2Backend {
		rx,
		inner: kinect,
		skeleton: None,
	}))
}

#[no_mangle]
pub unsafe extern "C" fn KinectV2_Create(callback: KinectV2Callback, userdata: *mut c_void, result: &mut HRESULT) -> *mut KinectV2Sensor {
	let (sensor, hr) = KinectV2Sensor::create(callback, userdata);
	*result = hr;

	if hr.is_ok() {
		sensor
	} else {
		drop(Box::from_raw(sensor));
		std::ptr::null_mut()
	}
}

#[no_mangle]
pub unsafe extern "C" fn KinectV2_Run(sensor: *mut KinectV2Sensor) {
	(*sensor).run()
}

#[no_mangle]
pub unsafe extern "C" fn KinectV2_Destroy(sensor: *mut KinectV2Sensor) {
	if !sensor.is_null() {
		drop(Box::from_raw(sensor));
	}
}

#[no_mangle]
pub unsafe extern "C" fn KinectV2_UserData(sensor: *const KinectV2Sensor) -> *mut c_void {
	(*sensor).userdata()
}

#[no_mangle]
pub unsafe extern "C" fn KinectV2_IsAvailable(sensor: *const KinectV2Sensor) -> bool {
	(*sensor).is_available()
}
