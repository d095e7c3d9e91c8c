//! C-callable dispatch surface.
//!
//! Handles are opaque pointers minted from a process-wide object table, so
//! releasing a handle twice is detected instead of corrupting memory.
//! Fatal errors are never printed; they land in a pull-model last-error
//! channel (`vsk_last_error_code` / `vsk_last_error_message`) and on the
//! `log` facade.
//!
//! Iterator state lives entirely in caller-provided storage of the
//! per-width size and alignment declared in `traversal`; the library
//! performs no allocation on the init or iterate paths. The state holds
//! non-owning references to the volume and selector, which the caller must
//! keep alive (and not recommit) for the duration of the iteration.

pub mod error;

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};

use glam::{IVec3, Vec3};

use crate::math::Range1;
use crate::selector::ValueSelector;
use crate::traversal::{
    IntervalIterator, IntervalSoa, RaySoa, ITERATOR_STATE_SIZE_1, ITERATOR_STATE_SIZE_16,
    ITERATOR_STATE_SIZE_4, ITERATOR_STATE_SIZE_8, LANE_WIDTHS,
};
use crate::volume::procedural;
use crate::volume::structured::StructuredVolume;
use crate::volume::voxels::{VoxelBuffer, VoxelType};

use error::KernelError;

/// Lane width the backend computes with natively.
pub const NATIVE_SIMD_WIDTH: i32 = 8;

/// Opaque object handle.
pub type VskObject = *mut c_void;

/// Bounding box as exposed at the ABI.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default)]
pub struct VskBox3f {
    pub lower: [f32; 3],
    pub upper: [f32; 3],
}

// ---------------------------------------------------------------------------
// last-error channel
// ---------------------------------------------------------------------------

struct LastError {
    code: i32,
    message: CString,
}

static LAST_ERROR: Mutex<Option<LastError>> = Mutex::new(None);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn record_error(err: KernelError) {
    log::error!("{err}");
    let message = CString::new(err.to_string()).unwrap_or_default();
    *lock(&LAST_ERROR) = Some(LastError {
        code: err.code(),
        message,
    });
}

fn clear_error() {
    *lock(&LAST_ERROR) = None;
}

/// Code of the most recent fatal error, or 0 if none occurred.
#[no_mangle]
pub extern "C" fn vsk_last_error_code() -> i32 {
    lock(&LAST_ERROR).as_ref().map_or(0, |e| e.code)
}

/// Message of the most recent fatal error, or null if none occurred. The
/// pointer stays valid until the next failing call.
#[no_mangle]
pub extern "C" fn vsk_last_error_message() -> *const c_char {
    lock(&LAST_ERROR)
        .as_ref()
        .map_or(std::ptr::null(), |e| e.message.as_ptr())
}

// ---------------------------------------------------------------------------
// staged parameters
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
enum ParamValue {
    Int(i32),
    Float(f32),
    Vec3i(IVec3),
    Vec3f(Vec3),
    Data(VoxelBuffer),
}

#[derive(Default)]
struct ParamSet {
    values: HashMap<String, ParamValue>,
}

impl ParamSet {
    fn set(&mut self, name: &str, value: ParamValue) {
        self.values.insert(name.to_string(), value);
    }

    fn vec3i(&self, name: &'static str) -> Result<IVec3, KernelError> {
        match self.values.get(name) {
            Some(ParamValue::Vec3i(v)) => Ok(*v),
            Some(_) => Err(KernelError::InvalidParameter {
                name,
                reason: "expected a vec3i".to_string(),
            }),
            None => Err(KernelError::MissingParameter(name)),
        }
    }

    fn vec3f(&self, name: &'static str) -> Result<Vec3, KernelError> {
        match self.values.get(name) {
            Some(ParamValue::Vec3f(v)) => Ok(*v),
            Some(_) => Err(KernelError::InvalidParameter {
                name,
                reason: "expected a vec3f".to_string(),
            }),
            None => Err(KernelError::MissingParameter(name)),
        }
    }

    fn data(&self, name: &'static str) -> Result<&VoxelBuffer, KernelError> {
        match self.values.get(name) {
            Some(ParamValue::Data(v)) => Ok(v),
            Some(_) => Err(KernelError::InvalidParameter {
                name,
                reason: "expected a data buffer".to_string(),
            }),
            None => Err(KernelError::MissingParameter(name)),
        }
    }

    fn int_or(&self, name: &'static str, default: i32) -> Result<i32, KernelError> {
        match self.values.get(name) {
            Some(ParamValue::Int(v)) => Ok(*v),
            Some(_) => Err(KernelError::InvalidParameter {
                name,
                reason: "expected an int".to_string(),
            }),
            None => Ok(default),
        }
    }
}

// ---------------------------------------------------------------------------
// object table
// ---------------------------------------------------------------------------

struct DriverSlot {
    name: String,
    committed: bool,
}

struct VolumeSlot {
    kind: String,
    staged: Mutex<ParamSet>,
    committed: RwLock<Option<Arc<StructuredVolume>>>,
}

struct SelectorSlot {
    staged: Mutex<Vec<Range1>>,
    committed: RwLock<Option<Arc<ValueSelector>>>,
}

enum Object {
    Driver(DriverSlot),
    Volume(Arc<VolumeSlot>),
    Selector(Arc<SelectorSlot>),
}

#[derive(Default)]
struct ObjectTable {
    next_id: u64,
    objects: HashMap<u64, Object>,
}

fn table() -> &'static Mutex<ObjectTable> {
    static TABLE: OnceLock<Mutex<ObjectTable>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(ObjectTable::default()))
}

static CURRENT_DRIVER: AtomicU64 = AtomicU64::new(0);

/// Selector state used when a handle's commit never succeeded: matches
/// nothing, so iteration reports done immediately.
static REJECT_ALL_SELECTOR: ValueSelector = ValueSelector::reject_all();

fn insert_object(object: Object) -> VskObject {
    let mut guard = lock(table());
    guard.next_id += 1;
    let id = guard.next_id;
    guard.objects.insert(id, object);
    id as usize as VskObject
}

fn handle_id(handle: VskObject) -> u64 {
    handle as usize as u64
}

fn volume_slot(handle: VskObject) -> Result<Arc<VolumeSlot>, KernelError> {
    match lock(table()).objects.get(&handle_id(handle)) {
        Some(Object::Volume(slot)) => Ok(slot.clone()),
        Some(_) => Err(KernelError::WrongObjectType),
        None => Err(KernelError::InvalidHandle),
    }
}

fn selector_slot(handle: VskObject) -> Result<Arc<SelectorSlot>, KernelError> {
    match lock(table()).objects.get(&handle_id(handle)) {
        Some(Object::Selector(slot)) => Ok(slot.clone()),
        Some(_) => Err(KernelError::WrongObjectType),
        None => Err(KernelError::InvalidHandle),
    }
}

fn committed_volume(handle: VskObject) -> Result<Arc<StructuredVolume>, KernelError> {
    let slot = volume_slot(handle)?;
    let guard = slot.committed.read().unwrap_or_else(PoisonError::into_inner);
    guard.clone().ok_or(KernelError::NotCommitted)
}

fn require_current_driver() -> Result<(), KernelError> {
    let id = CURRENT_DRIVER.load(Ordering::Acquire);
    if id == 0 {
        return Err(KernelError::NoCurrentDriver);
    }
    match lock(table()).objects.get(&id) {
        Some(Object::Driver(d)) if d.committed => Ok(()),
        _ => Err(KernelError::NoCurrentDriver),
    }
}

unsafe fn read_name(name: *const c_char) -> Result<String, KernelError> {
    if name.is_null() {
        return Err(KernelError::InvalidParameter {
            name: "name",
            reason: "null string".to_string(),
        });
    }
    CStr::from_ptr(name)
        .to_str()
        .map(str::to_owned)
        .map_err(|_| KernelError::InvalidParameter {
            name: "name",
            reason: "string is not valid UTF-8".to_string(),
        })
}

// ---------------------------------------------------------------------------
// driver lifecycle
// ---------------------------------------------------------------------------

/// Create a driver by name. Unknown names are rejected at commit.
///
/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn vsk_new_driver(name: *const c_char) -> VskObject {
    clear_error();
    match read_name(name) {
        Ok(name) => insert_object(Object::Driver(DriverSlot {
            name,
            committed: false,
        })),
        Err(err) => {
            record_error(err);
            std::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub extern "C" fn vsk_commit_driver(driver: VskObject) {
    clear_error();
    let mut guard = lock(table());
    match guard.objects.get_mut(&handle_id(driver)) {
        Some(Object::Driver(slot)) => {
            if slot.name == "native" {
                slot.committed = true;
            } else {
                let name = slot.name.clone();
                drop(guard);
                record_error(KernelError::UnknownDriver(name));
            }
        }
        Some(_) => {
            drop(guard);
            record_error(KernelError::WrongObjectType);
        }
        None => {
            drop(guard);
            record_error(KernelError::InvalidHandle);
        }
    }
}

/// Bind the process-wide default driver. The driver must be committed.
#[no_mangle]
pub extern "C" fn vsk_set_current_driver(driver: VskObject) {
    clear_error();
    let id = handle_id(driver);
    let committed = matches!(
        lock(table()).objects.get(&id),
        Some(Object::Driver(DriverSlot {
            committed: true,
            ..
        }))
    );
    if committed {
        CURRENT_DRIVER.store(id, Ordering::Release);
    } else {
        record_error(KernelError::NotCommitted);
    }
}

#[no_mangle]
pub extern "C" fn vsk_get_native_simd_width() -> i32 {
    NATIVE_SIMD_WIDTH
}

// ---------------------------------------------------------------------------
// volume and selector lifecycle
// ---------------------------------------------------------------------------

/// Create a volume of the named kind. Kind validation happens at commit.
///
/// # Safety
/// `kind` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn vsk_new_volume(kind: *const c_char) -> VskObject {
    clear_error();
    let result = read_name(kind).and_then(|kind| {
        require_current_driver()?;
        Ok(insert_object(Object::Volume(Arc::new(VolumeSlot {
            kind,
            staged: Mutex::new(ParamSet::default()),
            committed: RwLock::new(None),
        }))))
    });
    match result {
        Ok(handle) => handle,
        Err(err) => {
            record_error(err);
            std::ptr::null_mut()
        }
    }
}

/// Create a value selector associated with a volume.
#[no_mangle]
pub extern "C" fn vsk_new_value_selector(volume: VskObject) -> VskObject {
    clear_error();
    match volume_slot(volume) {
        Ok(_) => insert_object(Object::Selector(Arc::new(SelectorSlot {
            staged: Mutex::new(Vec::new()),
            committed: RwLock::new(None),
        }))),
        Err(err) => {
            record_error(err);
            std::ptr::null_mut()
        }
    }
}

/// Stage the selector's scalar ranges as `count` (lo, hi) float pairs.
///
/// # Safety
/// `ranges` must point to `2 * count` floats.
#[no_mangle]
pub unsafe extern "C" fn vsk_selector_set_ranges(
    selector: VskObject,
    count: u64,
    ranges: *const f32,
) {
    clear_error();
    match selector_slot(selector) {
        Ok(slot) => {
            let floats = std::slice::from_raw_parts(ranges, 2 * count as usize);
            let staged: Vec<Range1> = floats
                .chunks_exact(2)
                .map(|pair| Range1::new(pair[0], pair[1]))
                .collect();
            *lock(&slot.staged) = staged;
        }
        Err(err) => record_error(err),
    }
}

unsafe fn set_param(object: VskObject, name: *const c_char, value: ParamValue) {
    clear_error();
    let result = read_name(name).and_then(|name| {
        let slot = volume_slot(object)?;
        lock(&slot.staged).set(&name, value);
        Ok(())
    });
    if let Err(err) = result {
        record_error(err);
    }
}

/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn vsk_set_param_int(object: VskObject, name: *const c_char, value: i32) {
    set_param(object, name, ParamValue::Int(value));
}

/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn vsk_set_param_float(object: VskObject, name: *const c_char, value: f32) {
    set_param(object, name, ParamValue::Float(value));
}

/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn vsk_set_param_vec3i(
    object: VskObject,
    name: *const c_char,
    x: i32,
    y: i32,
    z: i32,
) {
    set_param(object, name, ParamValue::Vec3i(IVec3::new(x, y, z)));
}

/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn vsk_set_param_vec3f(
    object: VskObject,
    name: *const c_char,
    x: f32,
    y: f32,
    z: f32,
) {
    set_param(object, name, ParamValue::Vec3f(Vec3::new(x, y, z)));
}

/// Stage a voxel data buffer. The buffer is copied; the caller keeps
/// ownership of `data`.
///
/// # Safety
/// `data` must point to `count` elements of the given voxel type and `name`
/// must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn vsk_set_param_data(
    object: VskObject,
    name: *const c_char,
    data: *const c_void,
    voxel_type: u32,
    count: u64,
) {
    clear_error();
    let Some(ty) = VoxelType::from_u32(voxel_type) else {
        record_error(KernelError::InvalidParameter {
            name: "voxelType",
            reason: format!("unknown voxel type id {voxel_type}"),
        });
        return;
    };

    let count = count as usize;
    let buffer = match ty {
        VoxelType::U8 => {
            VoxelBuffer::U8(std::slice::from_raw_parts(data as *const u8, count).to_vec())
        }
        VoxelType::U16 => {
            VoxelBuffer::U16(std::slice::from_raw_parts(data as *const u16, count).to_vec())
        }
        VoxelType::F32 => {
            VoxelBuffer::F32(std::slice::from_raw_parts(data as *const f32, count).to_vec())
        }
        VoxelType::F64 => {
            VoxelBuffer::F64(std::slice::from_raw_parts(data as *const f64, count).to_vec())
        }
    };
    set_param(object, name, ParamValue::Data(buffer));
}

fn build_volume(kind: &str, params: &ParamSet) -> Result<StructuredVolume, KernelError> {
    match kind {
        "structured_regular" => {
            let dims = params.vec3i("dimensions")?;
            let origin = params.vec3f("gridOrigin")?;
            let spacing = params.vec3f("gridSpacing")?;
            let voxels = params.data("voxelData")?.clone();
            StructuredVolume::new(dims, origin, spacing, voxels)
        }
        "wavelet_analytical_volume" => {
            let dims = params.vec3i("dimensions")?;
            let origin = params.vec3f("gridOrigin")?;
            let spacing = params.vec3f("gridSpacing")?;
            procedural::wavelet_volume(dims, origin, spacing)
        }
        "noise_procedural_volume" => {
            let dims = params.vec3i("dimensions")?;
            let origin = params.vec3f("gridOrigin")?;
            let spacing = params.vec3f("gridSpacing")?;
            let seed = params.int_or("seed", 0)?;
            procedural::noise_volume(dims, origin, spacing, seed as u32)
        }
        other => Err(KernelError::UnknownVolumeKind(other.to_string())),
    }
}

fn commit_volume(slot: &VolumeSlot) -> Result<(), KernelError> {
    let built = {
        let staged = lock(&slot.staged);
        build_volume(&slot.kind, &staged)?
    };
    // single swap: concurrent readers observe either the old volume or the
    // new one, never a partially built state
    *slot
        .committed
        .write()
        .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(built));
    Ok(())
}

fn commit_selector(slot: &SelectorSlot) -> Result<(), KernelError> {
    let built = {
        let staged = lock(&slot.staged);
        ValueSelector::new(&staged)?
    };
    *slot
        .committed
        .write()
        .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(built));
    Ok(())
}

/// Promote staged parameters into committed state. On failure the object
/// stays in its previous committed state (possibly uncommitted).
#[no_mangle]
pub extern "C" fn vsk_commit(object: VskObject) {
    clear_error();

    enum Target {
        Volume(Arc<VolumeSlot>),
        Selector(Arc<SelectorSlot>),
        Driver,
    }

    let target = {
        let guard = lock(table());
        match guard.objects.get(&handle_id(object)) {
            Some(Object::Volume(slot)) => Ok(Target::Volume(slot.clone())),
            Some(Object::Selector(slot)) => Ok(Target::Selector(slot.clone())),
            Some(Object::Driver(_)) => Ok(Target::Driver),
            None => Err(KernelError::InvalidHandle),
        }
    };

    match target {
        Ok(Target::Volume(slot)) => {
            if let Err(err) = commit_volume(&slot) {
                record_error(err);
            }
        }
        Ok(Target::Selector(slot)) => {
            if let Err(err) = commit_selector(&slot) {
                record_error(err);
            }
        }
        Ok(Target::Driver) => vsk_commit_driver(object),
        Err(err) => record_error(err),
    }
}

/// Destroy an object. Releasing an already released handle is fatal.
#[no_mangle]
pub extern "C" fn vsk_release(object: VskObject) {
    clear_error();
    let id = handle_id(object);
    let removed = lock(table()).objects.remove(&id);
    match removed {
        Some(_) => {
            // a released driver can no longer be the process default
            let _ = CURRENT_DRIVER.compare_exchange(id, 0, Ordering::AcqRel, Ordering::Acquire);
        }
        None => record_error(KernelError::InvalidHandle),
    }
}

// ---------------------------------------------------------------------------
// queries
// ---------------------------------------------------------------------------

/// Bounding box of a committed volume.
///
/// # Safety
/// `out` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn vsk_get_bounding_box(volume: VskObject, out: *mut VskBox3f) {
    clear_error();
    match committed_volume(volume) {
        Ok(v) => {
            let bbox = v.bounding_box();
            (*out).lower = bbox.lower.to_array();
            (*out).upper = bbox.upper.to_array();
        }
        Err(err) => record_error(err),
    }
}

/// Sample a committed volume at one world-space position.
///
/// # Safety
/// `point` must point to 3 floats and `value` to 1 float.
#[no_mangle]
pub unsafe extern "C" fn vsk_compute_sample(
    volume: VskObject,
    point: *const f32,
    value: *mut f32,
) {
    clear_error();
    match committed_volume(volume) {
        Ok(v) => {
            let p = std::slice::from_raw_parts(point, 3);
            *value = v.sample_one(Vec3::new(p[0], p[1], p[2]));
        }
        Err(err) => record_error(err),
    }
}

/// Sample a committed volume at `count` positions given as xyz triplets.
///
/// # Safety
/// `points` must point to `3 * count` floats and `values` to `count` floats.
#[no_mangle]
pub unsafe extern "C" fn vsk_compute_sample_many(
    volume: VskObject,
    count: u64,
    points: *const f32,
    values: *mut f32,
) {
    clear_error();
    match committed_volume(volume) {
        Ok(v) => {
            let count = count as usize;
            let points = std::slice::from_raw_parts(points, 3 * count);
            let values = std::slice::from_raw_parts_mut(values, count);
            for (triplet, value) in points.chunks_exact(3).zip(values.iter_mut()) {
                *value = v.sample_one(Vec3::new(triplet[0], triplet[1], triplet[2]));
            }
        }
        Err(err) => record_error(err),
    }
}

// ---------------------------------------------------------------------------
// interval iterators
// ---------------------------------------------------------------------------

/// Opaque iterator storage, width 1.
#[repr(C, align(64))]
pub struct VskIntervalIterator1 {
    opaque: [u8; ITERATOR_STATE_SIZE_1],
}

/// Opaque iterator storage, width 4.
#[repr(C, align(16))]
pub struct VskIntervalIterator4 {
    opaque: [u8; ITERATOR_STATE_SIZE_4],
}

/// Opaque iterator storage, width 8.
#[repr(C, align(32))]
pub struct VskIntervalIterator8 {
    opaque: [u8; ITERATOR_STATE_SIZE_8],
}

/// Opaque iterator storage, width 16.
#[repr(C, align(64))]
pub struct VskIntervalIterator16 {
    opaque: [u8; ITERATOR_STATE_SIZE_16],
}

/// Internal layout written into the opaque storage. `live` distinguishes a
/// successfully initialized iterator from one whose init failed, so iterate
/// on a failed state is well defined (all lanes report done).
#[repr(C)]
struct AbiState<const W: usize> {
    live: u32,
    iter: MaybeUninit<IntervalIterator<'static, W>>,
}

const _: () = {
    assert!(std::mem::size_of::<AbiState<1>>() <= ITERATOR_STATE_SIZE_1);
    assert!(std::mem::size_of::<AbiState<4>>() <= ITERATOR_STATE_SIZE_4);
    assert!(std::mem::size_of::<AbiState<8>>() <= ITERATOR_STATE_SIZE_8);
    assert!(std::mem::size_of::<AbiState<16>>() <= ITERATOR_STATE_SIZE_16);
    assert!(std::mem::align_of::<AbiState<1>>() <= 64);
    assert!(std::mem::align_of::<AbiState<4>>() <= 16);
    assert!(std::mem::align_of::<AbiState<8>>() <= 32);
    assert!(std::mem::align_of::<AbiState<16>>() <= 64);
};

unsafe fn init_iterator_impl<const W: usize>(
    valid: *const i32,
    state: *mut AbiState<W>,
    volume: VskObject,
    org_soa: *const f32,
    dir_soa: *const f32,
    t_range_soa: *const f32,
    selector: VskObject,
) {
    clear_error();
    (*state).live = 0;

    if !LANE_WIDTHS.contains(&W) {
        record_error(KernelError::UnsupportedWidth(W as u32));
        return;
    }

    let volume_arc = match committed_volume(volume) {
        Ok(v) => v,
        Err(err) => {
            record_error(err);
            return;
        }
    };

    let selector_ref: Option<&'static ValueSelector> = if selector.is_null() {
        None
    } else {
        match selector_slot(selector) {
            Ok(slot) => {
                let guard = slot.committed.read().unwrap_or_else(PoisonError::into_inner);
                match guard.as_ref() {
                    // non-owning: the table entry keeps the Arc alive
                    Some(arc) => Some(&*Arc::as_ptr(arc)),
                    None => Some(&REJECT_ALL_SELECTOR),
                }
            }
            Err(err) => {
                record_error(err);
                return;
            }
        }
    };

    let mut rays = RaySoa::<W>::zeroed();
    let org = std::slice::from_raw_parts(org_soa, 3 * W);
    let dir = std::slice::from_raw_parts(dir_soa, 3 * W);
    let t_range = std::slice::from_raw_parts(t_range_soa, 2 * W);
    rays.org_x.copy_from_slice(&org[0..W]);
    rays.org_y.copy_from_slice(&org[W..2 * W]);
    rays.org_z.copy_from_slice(&org[2 * W..3 * W]);
    rays.dir_x.copy_from_slice(&dir[0..W]);
    rays.dir_y.copy_from_slice(&dir[W..2 * W]);
    rays.dir_z.copy_from_slice(&dir[2 * W..3 * W]);
    rays.t_lower.copy_from_slice(&t_range[0..W]);
    rays.t_upper.copy_from_slice(&t_range[W..2 * W]);

    let valid = std::slice::from_raw_parts(valid, W);
    let mut valid_mask = [false; W];
    for i in 0..W {
        valid_mask[i] = valid[i] != 0;
    }

    // non-owning reference into the table-held Arc; the caller guarantees
    // the volume outlives the iteration
    let volume_ref: &'static StructuredVolume = &*Arc::as_ptr(&volume_arc);

    (*state)
        .iter
        .write(IntervalIterator::new(volume_ref, &rays, &valid_mask, selector_ref));
    (*state).live = 1;
}

unsafe fn iterate_impl<const W: usize>(
    valid: *const i32,
    state: *mut AbiState<W>,
    interval: *mut IntervalSoa<W>,
    result: *mut i32,
) {
    let result = std::slice::from_raw_parts_mut(result, W);
    if (*state).live == 0 {
        result.fill(0);
        return;
    }

    let valid = std::slice::from_raw_parts(valid, W);
    let mut valid_mask = [false; W];
    for i in 0..W {
        valid_mask[i] = valid[i] != 0;
    }

    let mut flags = [0i32; W];
    (*state)
        .iter
        .assume_init_mut()
        .iterate(&valid_mask, &mut *interval, &mut flags);
    result.copy_from_slice(&flags);
}

macro_rules! iterator_entry_points {
    ($init:ident, $iterate:ident, $storage:ty, $width:literal) => {
        /// Fill caller-provided iterator storage for a lane group.
        ///
        /// # Safety
        /// All pointers must be valid for the documented widths; the volume
        /// and selector must stay alive and uncommitted-over for the
        /// duration of the iteration.
        #[no_mangle]
        pub unsafe extern "C" fn $init(
            valid: *const i32,
            state: *mut $storage,
            volume: VskObject,
            org_soa: *const f32,
            dir_soa: *const f32,
            t_range_soa: *const f32,
            selector: VskObject,
        ) {
            init_iterator_impl::<$width>(
                valid,
                state as *mut AbiState<$width>,
                volume,
                org_soa,
                dir_soa,
                t_range_soa,
                selector,
            );
        }

        /// Advance a lane group; `result[i]` is 1 iff lane i emitted.
        ///
        /// # Safety
        /// `state` must have been filled by the matching init entry point.
        #[no_mangle]
        pub unsafe extern "C" fn $iterate(
            valid: *const i32,
            state: *mut $storage,
            interval: *mut IntervalSoa<$width>,
            result: *mut i32,
        ) {
            iterate_impl::<$width>(valid, state as *mut AbiState<$width>, interval, result);
        }
    };
}

iterator_entry_points!(
    vsk_init_interval_iterator_1,
    vsk_iterate_interval_1,
    VskIntervalIterator1,
    1
);
iterator_entry_points!(
    vsk_init_interval_iterator_4,
    vsk_iterate_interval_4,
    VskIntervalIterator4,
    4
);
iterator_entry_points!(
    vsk_init_interval_iterator_8,
    vsk_iterate_interval_8,
    VskIntervalIterator8,
    8
);
iterator_entry_points!(
    vsk_init_interval_iterator_16,
    vsk_iterate_interval_16,
    VskIntervalIterator16,
    16
);

impl Default for VskIntervalIterator1 {
    fn default() -> Self {
        Self {
            opaque: [0; ITERATOR_STATE_SIZE_1],
        }
    }
}

impl Default for VskIntervalIterator4 {
    fn default() -> Self {
        Self {
            opaque: [0; ITERATOR_STATE_SIZE_4],
        }
    }
}

impl Default for VskIntervalIterator8 {
    fn default() -> Self {
        Self {
            opaque: [0; ITERATOR_STATE_SIZE_8],
        }
    }
}

impl Default for VskIntervalIterator16 {
    fn default() -> Self {
        Self {
            opaque: [0; ITERATOR_STATE_SIZE_16],
        }
    }
}
