pub mod slots;

pub const SKELETON_BONE_COUNT: usize = 20;

pub type SkeletonRawBones = [[f32; 3]; SKELETON_BONE_COUNT];

pub trait MotionBackend {
	fn poll(&mut self) -> Option<MotionSkeleton>;
	fn available(&self) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub enum MotionSkeleton {
	#[default]
	Untracked,
	Tracked(TrackedSkeleton),
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union TrackedSkeleton {
	raw_bones: SkeletonRawBones,
	bones: SkeletonBones,
}
impl TrackedSkeleton {
	#[inline(always)]
	pub fn from_raw_bones(raw_bones: SkeletonRawBones) -> Self {
		Self { raw_bones }
	}

	#[inline(always)]
	pub fn from_named_bones(bones: SkeletonBones) -> Self {
		Self { bones }
	}

	#[inline(always)]
	pub fn raw_bones(&self) -> &SkeletonRawBones {
		unsafe { &self.raw_bones }
	}

	#[inline(always)]
	pub fn bones(&self) -> &SkeletonBones {
		unsafe { &self.bones }
	}
}
impl std::fmt::Debug for TrackedSkeleton {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.bones().fmt(f)
	}
}
impl Default for TrackedSkeleton {
	fn default() -> Self {
		Self {
			raw_bones: [[0.0; 3]; SKELETON_BONE_COUNT],
		}
	}
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct SkeletonBones {
	pub hip_center: [f32; 3],
	pub spine: [f32; 3],
	pub shoulder_center: [f32; 3],
	pub head: [f32; 3],
	pub shoulder_left: [f32; 3],
	pub elbow_left: [f32; 3],
	pub wrist_left: [f32; 3],
	pub hand_left: [f32; 3],
	pub shoulder_right: [f32; 3],
	pub elbow_right: [f32; 3],
	pub wrist_right: [f32; 3],
	pub hand_right: [f32; 3],
	pub hip_left: [f32; 3],
	pub knee_left: [f32; 3],
	pub ankle_left: [f32; 3],
	pub foot_left: [f32; 3],
	pub hip_right: [f32; 3],
	pub knee_right: [f32; 3],
	pub ankle_right: [f32; 3],
	pub foot_right: [f32; 3],
}

struct DynMotionBackend {
	backend: Box<dyn MotionBackend>,
	_lib: libloading::Library,
}
impl DynMotionBackend {
	unsafe fn load(backend: &str) -> Option<Self> {
		log::info!("{}: Loading...", backend);

		type MotionBackendInit = unsafe extern "Rust" fn(&'static dyn log::Log) -> Result<Box<dyn MotionBackend>, std::io::Error>;

		let lib = libloading::Library::new(backend);
		let lib = lib.and_then(|lib| Ok((*lib.get::<MotionBackendInit>(b"gmcl_motionlink_init")?, lib)));

		match lib {
			Ok((init, lib)) => match init(log::logger()) {
				Ok(loaded) => {
					log::info!("{}: OK!", backend);
					Some(Self { _lib: lib, backend: loaded })
				}

				Err(err) => {
					log::warn!("{}: {err:?}", backend);
					None
				}
			},

			Err(err) => {
				log::warn!("{}: {err:?}", backend);
				None
			}
		}
	}
}

pub struct Motion {
	backends: Box<[DynMotionBackend]>,
}
impl Motion {
	pub fn new() -> Result<Self, std::io::Error> {
		let mut backends = Vec::new();

		macro_rules! try_load_backend {
			($backend:expr) => {
				for backend in [concat!("garrysmod/lua/bin/", $backend), $backend] {
					if let Some(backend) = unsafe { DynMotionBackend::load(backend) } {
						backends.push(backend);
						break;
					}
				}
			};
		}

		if cfg!(all(windows, target_pointer_width = "64")) {
			try_load_backend!("motionlink_winsdk_v2_win64.dll");
			try_load_backend!("motionlink_winsdk_v1_win64.dll");
		} else if cfg!(all(windows, target_pointer_width = "32")) {
			try_load_backend!("motionlink_winsdk_v2_win32.dll");
			try_load_backend!("motionlink_winsdk_v1_win32.dll");
		}

		if !backends.is_empty() {
			Ok(Motion {
				backends: backends.into_boxed_slice(),
			})
		} else {
			Err(std::io::Error::new(
				std::io::ErrorKind::Unsupported,
				"No backend available, did you remember to install one?",
			))
		}
	}

	#[inline]
	pub fn poll(&mut self) -> Option<MotionSkeleton> {
		self.backends.iter_mut().find_map(|backend| backend.backend.poll())
	}

	#[inline]
	pub fn available(&self) -> bool {
		self.backends.iter().any(|backend| backend.backend.available())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	};

	struct FakeBackend {
		available: Arc<AtomicBool>,
	}
	impl MotionBackend for FakeBackend {
		fn poll(&mut self) -> Option<MotionSkeleton> {
			None
		}

		fn available(&self) -> bool {
			self.available.load(Ordering::Acquire)
		}
	}

	#[test]
	fn availability_reflects_latest_observation() {
		let flag = Arc::new(AtomicBool::new(false));
		let backend: Box<dyn MotionBackend> = Box::new(FakeBackend { available: flag.clone() });

		assert!(!backend.available());

		// Availability events arrive from the device thread
		let publisher = flag.clone();
		std::thread::spawn(move || publisher.store(true, Ordering::Release)).join().unwrap();
		assert!(backend.available());

		flag.store(false, Ordering::Release);
		assert!(!backend.available());
	}

	#[test]
	fn tracked_skeleton_raw_and_named_alias() {
		let mut raw = SkeletonRawBones::default();
		for (i, bone) in raw.iter_mut().enumerate() {
			*bone = [i as f32, i as f32 + 0.5, -(i as f32)];
		}

		let skeleton = TrackedSkeleton::from_raw_bones(raw);
		assert_eq!(skeleton.raw_bones(), &raw);
		assert_eq!(skeleton.bones().hip_center, raw[0]);
		assert_eq!(skeleton.bones().spine, raw[1]);
		assert_eq!(skeleton.bones().foot_right, raw[19]);
	}
}
