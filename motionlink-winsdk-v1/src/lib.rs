#![cfg(windows)]

pub mod ffi;
mod sensor;

pub use sensor::{KinectV1Callback, KinectV1Sensor, KinectV1Skeleton, KinectV1SkeletonUpdate, SkeletonPos, SkeletonPositionOnly, SkeletonTracked};

use motionlink::{MotionBackend, MotionSkeleton, SkeletonRawBones, TrackedSkeleton};
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
fn convert_camera_space_to_game(vector: &ffi::Vector4) -> [f32; 3] {
	[-vector.x, vector.z, vector.y]
}

pub type KinectV1TypedCallback<U> = extern "C" fn(KinectV1SkeletonUpdate, &mut U);

struct SendPtr<T>(*mut T);
unsafe impl<T> Send for SendPtr<T> {}
unsafe impl<T> Sync for SendPtr<T> {}

/// Owns the device thread; dropping posts `WM_QUIT` to it and joins.
pub struct KinectV1<U> {
	thread: ManuallyDrop<std::thread::JoinHandle<()>>,
	available: Arc<AtomicBool>,
	_userdata: PhantomData<U>,
}
impl<U> KinectV1<U> {
	#[inline]
	pub fn new(callback: KinectV1TypedCallback<U>, userdata: U) -> Result<Self, std::io::Error> {
		Self::new_(
			unsafe { core::mem::transmute::<_, KinectV1Callback>(callback) },
			Box::into_raw(Box::new(userdata)) as *mut c_void,
		)
	}

	fn new_(callback: KinectV1Callback, userdata: *mut c_void) -> Result<Self, std::io::Error> {
		let (sensor, hr) = KinectV1Sensor::create(callback, userdata);
		if hr.is_err() {
			unsafe { drop(Box::from_raw(sensor)) };
			unsafe { drop(Box::from_raw(userdata as *mut U)) };
			return Err(std::io::Error::new(
				std::io::ErrorKind::Other,
				format!("KinectV1Sensor::create() failed ({hr:?})"),
			));
		}

		let available = unsafe { (*sensor).availability() };

		Ok(Self {
			thread: ManuallyDrop::new({
				let sensor = SendPtr(sensor);
				let userdata = SendPtr(userdata as *mut U);
				std::thread::Builder::new()
					.name("motionlink_winsdk_v1".to_string())
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
impl<U> Drop for KinectV1<U> {
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

	struct SkeletonFrameEvent {
		slot: usize,
		bones: Option<[ffi::Vector4; ffi::NUI_SKELETON_POSITION_COUNT]>,
	}

	extern "C" fn callback(event: KinectV1SkeletonUpdate, tx: &mut std::sync::mpsc::SyncSender<SkeletonFrameEvent>) {
		// The pointers inside `event` die when this callback returns, so the
		// bones are copied out before the event crosses the channel.
		let bones = match event.pos() {
			Some(KinectV1Skeleton::Tracked(SkeletonTracked { bones, .. })) => Some(unsafe { *bones }),
			_ => None,
		};

		tx.send(SkeletonFrameEvent {
			slot: event.skeleton_index,
			bones,
		})
		.ok();
	}

	let (tx, rx) = std::sync::mpsc::sync_channel(1);
	let kinect = KinectV1::new(callback, tx)?;

	struct WinSdkV1Backend {
		rx: std::sync::mpsc::Receiver<SkeletonFrameEvent>,
		skeleton: Option<usize>,
		inner: KinectV1<std::sync::mpsc::SyncSender<SkeletonFrameEvent>>,
	}
	impl MotionBackend for WinSdkV1Backend {
		fn poll(&mut self) -> Option<MotionSkeleton> {
			let event = self.rx.try_recv().ok()?;
			if self.skeleton.is_none() || self.skeleton == Some(event.slot) {
				if let Some(bones) = event.bones {
					self.skeleton = Some(event.slot);

					let mut raw_bones = SkeletonRawBones::default();

					bones.iter().zip(raw_bones.iter_mut()).for_each(|(src, dst)| {
						*dst = convert_camera_space_to_game(src);
					});

					return Some(MotionSkeleton::Tracked(TrackedSkeleton::from_raw_bones(raw_bones)));
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

	Ok(Box::new(WinSdkV1Backend {
		rx,
		inner: kinect,
		skeleton: None,
	}))
}

#[no_mangle]
pub unsafe extern "C" fn KinectV1_Create(callback: KinectV1Callback, userdata: *mut c_void, result: &mut HRESULT) -> *mut KinectV1Sensor {
	let (sensor, hr) = KinectV1Sensor::create(callback, userdata);
	*result = hr;

	if hr.is_ok() {
		sensor
	} else {
		drop(Box::from_raw(sensor));
		std::ptr::null_mut()
	}
}

#[no_mangle]
pub unsafe extern "C" fn KinectV1_Run(sensor: *mut KinectV1Sensor) {
	(*sensor).run()
}

#[no_mangle]
pub unsafe extern "C" fn KinectV1_Destroy(sensor: *mut KinectV1Sensor) {
	if !sensor.is_null() {
		drop(Box::from_raw(sensor));
	}
}

#[no_mangle]
pub unsafe extern "C" fn KinectV1_UserData(sensor: *const KinectV1Sensor) -> *mut c_void {
	(*sensor).userdata()
}

#[no_mangle]
pub unsafe extern "C" fn KinectV1_IsAvailable(sensor: *const KinectV1Sensor) -> bool {
	(*sensor).is_available()
}
