//! Cross-process sensor relay.
//!
//! The client and server instances of the game share one process group but
//! separate Lua realms; only one of them may own the sensor. The first
//! realm to map the relay file becomes the host and publishes bone data
//! into it; every other realm mirrors, and a mirror promotes itself to host
//! when the host writes the shutdown byte.

use motionlink::{Motion, MotionSkeleton, SkeletonRawBones, SKELETON_BONE_COUNT};
use std::{
	ffi::OsString,
	fs::OpenOptions,
	mem::{size_of, ManuallyDrop},
	path::Path,
};

static mut INIT_REFCOUNT: usize = 0;
static mut RELAY: Option<RelayState> = None;

const RELAY_DIR: &str = "garrysmod/cache/gmcl_motionlink";

const MMAP_FILE_SIZE: u64 =
	(size_of::<u8>() + size_of::<u8>() + size_of::<u8>() + size_of::<u16>() + (size_of::<[f32; 3]>() * SKELETON_BONE_COUNT)) as u64;

const MMAP_SKELETON_NONE: u8 = 0;
const MMAP_SKELETON_TRACKED: u8 = 1;

const MMAP_SHUTDOWN: usize = 0;
const MMAP_ACTIVE: usize = 1;
const MMAP_SYNC: std::ops::Range<usize> = 2..4;
const MMAP_SKELETON: usize = 4;
const MMAP_SKELETON_BONES: std::ops::Range<usize> = 5..MMAP_FILE_SIZE as usize;

pub struct RelayState {
	mmap: memmap::MmapMut,
	pub skeleton: Option<SkeletonRawBones>,
	kind: RelayKind,
}
impl RelayState {
	fn new() -> Result<Self, std::io::Error> {
		// We're a mirror if another realm of this process already mapped the
		// relay file.
		let mmap_name = OsString::from(format!("sensor_{}", std::process::id()));
		let mirror = 'mirror: {
			if let Ok(dir) = std::fs::read_dir(RELAY_DIR) {
				for entry in dir.flatten() {
					let entry = entry.path();
					if entry.file_name() == Some(mmap_name.as_os_str()) {
						break 'mirror true;
					}
				}
			}
			break 'mirror false;
		};
		if !mirror {
			// Clean up relay files left over from dead processes
			std::fs::remove_dir_all(RELAY_DIR).ok();
		}

		std::fs::create_dir_all(RELAY_DIR)?;

		let mmap_path = Path::new(RELAY_DIR).join(mmap_name);

		let f = OpenOptions::new().write(true).read(true).truncate(false).create(true).open(mmap_path)?;

		f.set_len(MMAP_FILE_SIZE)?;

		let mut mmap = unsafe { memmap::MmapMut::map_mut(&f)? };

		if mirror {
			log::info!("mirror connected to relay");

			let mut mirror = Self {
				mmap,
				skeleton: None,
				kind: RelayKind::Mirror { sync: None },
			};

			mirror.update();

			Ok(mirror)
		} else {
			log::info!("relay host opened");

			let inner = Motion::new()?;

			mmap.fill(0);
			mmap.flush().ok();

			Ok(Self {
				mmap,
				skeleton: None,
				kind: RelayKind::Host {
					inner: ManuallyDrop::new(inner),
					sync: 0,
				},
			})
		}
	}

	pub fn update(&mut self) {
		match &mut self.kind {
			RelayKind::Host { inner, sync } => {
				if self.mmap[MMAP_ACTIVE] != 1 {
					return;
				}

				let Some(update) = inner.poll() else {
					return;
				};

				*sync = sync.wrapping_add(1);
				self.mmap[MMAP_SYNC].copy_from_slice(&u16::to_ne_bytes(*sync));

				if let MotionSkeleton::Tracked(skeleton) = update {
					self.mmap[MMAP_SKELETON] = MMAP_SKELETON_TRACKED;

					let cached = self.skeleton.get_or_insert_with(Default::default);

					for ((vec, mmap), cached) in skeleton
						.raw_bones()
						.iter()
						.zip(self.mmap[MMAP_SKELETON_BONES].chunks_exact_mut(size_of::<[f32; 3]>()))
						.zip(cached.iter_mut())
					{
						mmap[0..4].copy_from_slice(&f32::to_ne_bytes(vec[0]));
						mmap[4..8].copy_from_slice(&f32::to_ne_bytes(vec[1]));
						mmap[8..12].copy_from_slice(&f32::to_ne_bytes(vec[2]));

						*cached = *vec;
					}

					self.mmap
						.flush_range(MMAP_SYNC.start, (MMAP_SYNC.start..MMAP_SKELETON_BONES.end).len())
						.ok();
				} else {
					self.mmap[MMAP_SKELETON] = MMAP_SKELETON_NONE;
					self.mmap.flush_range(MMAP_SYNC.start, (MMAP_SYNC.start..MMAP_SKELETON).len()).ok();

					self.skeleton = None;
				}
			}

			RelayKind::Mirror { sync } => {
				let shutdown = self.mmap[MMAP_SHUTDOWN];
				if shutdown == 1 {
					log::info!("trying to promote to host");

					if let Ok(inner) = Motion::new() {
						if core::mem::replace(&mut self.mmap[MMAP_SHUTDOWN], 0) != 1 {
							// Another mirror won the race
							return self.update();
						}

						if self.mmap.flush_range(MMAP_SHUTDOWN, 1).is_ok() {
							self.kind = RelayKind::Host {
								inner: ManuallyDrop::new(inner),
								sync: sync.unwrap_or(0),
							};

							log::info!("promoted to host");

							return self.update();
						}
					}
					return;
				}

				let new_sync = Some(u16::from_ne_bytes(self.mmap[MMAP_SYNC].try_into().unwrap()));
				if new_sync == core::mem::replace(sync, new_sync) {
					// No changes
					return;
				}

				match self.mmap[MMAP_SKELETON] {
					MMAP_SKELETON_NONE => {
						self.skeleton = None;
					}

					MMAP_SKELETON_TRACKED => {
						let cached = self.skeleton.get_or_insert_with(Default::default);
						for (bone, cached) in self.mmap[MMAP_SKELETON_BONES]
							.chunks_exact(size_of::<[f32; 3]>())
							.zip(cached.iter_mut())
						{
							*cached = [
								f32::from_ne_bytes(bone[0..4].try_into().unwrap()),
								f32::from_ne_bytes(bone[4..8].try_into().unwrap()),
								f32::from_ne_bytes(bone[8..12].try_into().unwrap()),
							];
						}
					}

					_ => unreachable!(),
				}
			}
		}
	}

	pub fn active(&self) -> bool {
		self.mmap[MMAP_ACTIVE] == 1
	}

	pub fn set_active(&mut self, active: bool) {
		self.mmap[MMAP_ACTIVE] = active as u8;
		self.mmap.flush_range(MMAP_ACTIVE, 1).ok();
	}
}
impl Drop for RelayState {
	fn drop(&mut self) {
		if let RelayKind::Host { inner, .. } = &mut self.kind {
			// Shut down the sensor before announcing the handoff
			unsafe { ManuallyDrop::drop(inner) };

			self.mmap[MMAP_SHUTDOWN] = 1;
			self.mmap.flush_range(MMAP_SHUTDOWN, 1).ok();
		}
	}
}

enum RelayKind {
	Host { inner: ManuallyDrop<Motion>, sync: u16 },
	Mirror { sync: Option<u16> },
}

#[lua_function]
unsafe fn poll(_lua: gmod::lua::State) {
	if let Some(relay) = &mut RELAY {
		relay.update();
	}
}

pub unsafe fn init(lua: gmod::lua::State) {
	INIT_REFCOUNT += 1;

	if INIT_REFCOUNT != 1 {
		return;
	}

	match RelayState::new() {
		Ok(relay) => unsafe {
			RELAY = Some(relay);

			lua.get_global(lua_string!("hook"));
			lua.get_field(-1, lua_string!("Add"));
			lua.push_string("Think");
			lua.push_string("gmcl_motionlink");
			lua.push_function(poll);
			lua.call(3, 0);
			lua.pop();
		},

		Err(err) => {
			log::error!("{err:?}");
		}
	}
}

pub unsafe fn shutdown() {
	INIT_REFCOUNT = INIT_REFCOUNT.saturating_sub(1);

	if INIT_REFCOUNT == 0 {
		RELAY = None;
	}
}

pub unsafe fn already_initialized() -> bool {
	INIT_REFCOUNT != 0
}

#[inline]
pub unsafe fn state() -> Option<&'static mut RelayState> {
	RELAY.as_mut()
}
