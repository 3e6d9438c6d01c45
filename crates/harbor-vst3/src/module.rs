//! Plugin module loading.
//!
//! A [`Module`] is one opened plugin binary plus the factory it exports.
//!
//! # Lifetime
//!
//! ```text
//! Library::new ─► entry point ─► GetPluginFactory ─► Module
//!
//! drop(Module): release factory ─► exit point ─► unload library
//! ```
//!
//! Every COM object created through the factory points into the library's
//! code, so a [`Module`] must outlive every instance it created.

use std::ffi::{c_char, c_void};
use std::path::{Path, PathBuf};

use harbor_core::text::NAME_CAPACITY;
use harbor_core::{FixedText, HostError, HostResult};
use libloading::Library;
use log::{debug, info, warn};
use vst3::Steinberg::{
    kResultOk, IPluginFactory, IPluginFactory2, IPluginFactory2Trait as _,
    IPluginFactoryTrait as _, PClassInfo, PClassInfo2, PFactoryInfo, TUID,
};
use vst3::{ComPtr, Interface};

use crate::util::{guid_to_tuid, text_from_chars};

/// Category string of processing component classes.
pub const AUDIO_MODULE_CLASS: &str = "Audio Module Class";

/// Category string of edit controller classes.
pub const COMPONENT_CONTROLLER_CLASS: &str = "Component Controller Class";

type ExitFn = unsafe extern "C" fn() -> bool;
type GetFactoryFn = unsafe extern "C" fn() -> *mut IPluginFactory;

#[cfg(target_os = "macos")]
const EXIT_SYMBOL: &[u8] = b"bundleExit";
#[cfg(target_os = "windows")]
const EXIT_SYMBOL: &[u8] = b"ExitDll";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const EXIT_SYMBOL: &[u8] = b"ModuleExit";

const FACTORY_SYMBOL: &[u8] = b"GetPluginFactory";

// =============================================================================
// Factory and class metadata
// =============================================================================

/// Vendor information from `IPluginFactory::getFactoryInfo`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactoryInfo {
    pub vendor: FixedText<64>,
    pub url: FixedText<256>,
    pub email: FixedText<128>,
    pub flags: i32,
}

/// One class advertised by a plugin factory.
///
/// The `PClassInfo2` fields stay empty when the factory only implements
/// `IPluginFactory`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub cid: TUID,
    pub category: FixedText<32>,
    pub name: FixedText<NAME_CAPACITY>,
    pub vendor: FixedText<64>,
    pub version: FixedText<64>,
    pub sub_categories: FixedText<128>,
}

impl ClassInfo {
    fn from_basic(info: &PClassInfo) -> Self {
        Self {
            cid: info.cid,
            category: text_from_chars(&info.category),
            name: text_from_chars(&info.name),
            vendor: FixedText::new(),
            version: FixedText::new(),
            sub_categories: FixedText::new(),
        }
    }

    fn enrich(&mut self, info: &PClassInfo2) {
        self.vendor = text_from_chars(&info.vendor);
        self.version = text_from_chars(&info.version);
        self.sub_categories = text_from_chars(&info.subCategories);
    }

    /// Whether this class is a processing component.
    pub fn is_audio_module(&self) -> bool {
        self.category.as_str() == AUDIO_MODULE_CLASS
    }
}

// =============================================================================
// Module
// =============================================================================

/// An opened plugin binary and its factory.
pub struct Module {
    factory: Option<ComPtr<IPluginFactory>>,
    exit_fn: Option<ExitFn>,
    library: Option<Library>,
    path: Option<PathBuf>,
}

impl Module {
    /// Open a plugin bundle or binary.
    ///
    /// A `.vst3` bundle directory is resolved to the binary for the running
    /// platform; any other path is opened as-is.
    pub fn load(path: impl AsRef<Path>) -> HostResult<Self> {
        let path = path.as_ref();
        let binary = bundle_binary_path(path);
        if !binary.is_file() {
            return Err(HostError::Load(format!(
                "plugin binary not found: {}",
                binary.display()
            )));
        }

        // SAFETY: Opening a library runs its initializers. Plugin binaries are
        // trusted input for a host.
        let library = unsafe { Library::new(&binary) }.map_err(|e| {
            HostError::Load(format!("failed to open {}: {e}", binary.display()))
        })?;

        call_entry(&library)?;

        // SAFETY: The exit symbol has the VST3 module exit signature. The copied
        // function pointer is only called while `library` is still loaded.
        let exit_fn = unsafe { library.get::<ExitFn>(EXIT_SYMBOL) }
            .ok()
            .map(|symbol| *symbol);

        // From here on, dropping `module` runs the exit point and unloads.
        let mut module = Self {
            factory: None,
            exit_fn,
            library: None,
            path: Some(path.to_path_buf()),
        };

        // SAFETY: GetPluginFactory has this signature in every VST3 binary.
        let get_factory = unsafe { library.get::<GetFactoryFn>(FACTORY_SYMBOL) }
            .map(|symbol| *symbol)
            .map_err(|e| HostError::Load(format!("GetPluginFactory not found: {e}")));
        module.library = Some(library);
        let get_factory = get_factory?;

        // SAFETY: The library is loaded and its entry point has run.
        let raw = unsafe { get_factory() };
        // SAFETY: GetPluginFactory returns an owned reference or null.
        let factory = unsafe { ComPtr::from_raw(raw) }
            .ok_or_else(|| HostError::Load("GetPluginFactory returned null".into()))?;
        module.factory = Some(factory);

        info!("Loaded plugin module {}", binary.display());
        Ok(module)
    }

    /// Wrap a factory that lives in this process (statically linked plugins).
    pub fn from_factory(factory: ComPtr<IPluginFactory>) -> Self {
        Self {
            factory: Some(factory),
            exit_fn: None,
            library: None,
            path: None,
        }
    }

    /// Path the module was loaded from, `None` for in-process factories.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn factory(&self) -> HostResult<&ComPtr<IPluginFactory>> {
        self.factory
            .as_ref()
            .ok_or_else(|| HostError::Load("module has no factory".into()))
    }

    /// Vendor, URL and contact the factory reports.
    pub fn factory_info(&self) -> HostResult<FactoryInfo> {
        let factory = self.factory()?;
        // SAFETY: PFactoryInfo is plain C data; all-zero is a valid value.
        let mut raw: PFactoryInfo = unsafe { std::mem::zeroed() };
        // SAFETY: `raw` is a valid out-parameter for the duration of the call.
        let result = unsafe { factory.getFactoryInfo(&mut raw) };
        if result != kResultOk {
            return Err(HostError::Load(format!(
                "getFactoryInfo failed (result={result})"
            )));
        }
        Ok(FactoryInfo {
            vendor: text_from_chars(&raw.vendor),
            url: text_from_chars(&raw.url),
            email: text_from_chars(&raw.email),
            flags: raw.flags,
        })
    }

    /// Every class the factory advertises, in factory order.
    ///
    /// Classes the factory fails to describe are skipped.
    pub fn classes(&self) -> HostResult<Vec<ClassInfo>> {
        let factory = self.factory()?;
        let factory2 = factory.cast::<IPluginFactory2>();

        // SAFETY: Factory pointer is valid while the module is alive.
        let count = unsafe { factory.countClasses() };
        let mut classes = Vec::with_capacity(count.max(0) as usize);
        for index in 0..count {
            // SAFETY: PClassInfo is plain C data; all-zero is a valid value.
            let mut raw: PClassInfo = unsafe { std::mem::zeroed() };
            // SAFETY: `raw` is a valid out-parameter for the duration of the call.
            let result = unsafe { factory.getClassInfo(index, &mut raw) };
            if result != kResultOk {
                warn!("getClassInfo({index}) failed (result={result}), skipping class");
                continue;
            }
            let mut class = ClassInfo::from_basic(&raw);

            if let Some(factory2) = &factory2 {
                // SAFETY: PClassInfo2 is plain C data; all-zero is a valid value.
                let mut raw2: PClassInfo2 = unsafe { std::mem::zeroed() };
                // SAFETY: `raw2` is a valid out-parameter for the duration of the call.
                if unsafe { factory2.getClassInfo2(index, &mut raw2) } == kResultOk {
                    class.enrich(&raw2);
                }
            }
            classes.push(class);
        }
        Ok(classes)
    }

    /// The first processing component class the factory advertises.
    pub fn audio_module_class(&self) -> HostResult<ClassInfo> {
        let classes = self.classes()?;
        debug!("Factory advertises {} classes", classes.len());
        classes
            .into_iter()
            .find(ClassInfo::is_audio_module)
            .ok_or_else(|| {
                HostError::Load(format!("no \"{AUDIO_MODULE_CLASS}\" class in factory"))
            })
    }

    /// Instantiate class `cid` and query interface `I` on it.
    pub fn create_instance<I: Interface>(&self, cid: &TUID) -> HostResult<ComPtr<I>> {
        let factory = self.factory()?;
        let iid = guid_to_tuid(&I::IID);
        let mut obj: *mut c_void = std::ptr::null_mut();
        // SAFETY: `cid` and `iid` are 16-byte IDs; `obj` is a valid out-parameter.
        let result = unsafe { factory.createInstance(cid.as_ptr(), iid.as_ptr(), &mut obj) };
        if result != kResultOk || obj.is_null() {
            return Err(HostError::Init(format!(
                "createInstance failed (result={result})"
            )));
        }
        // SAFETY: On success `obj` is an owned reference to interface `I`.
        unsafe { ComPtr::from_raw(obj as *mut I) }
            .ok_or_else(|| HostError::Init("createInstance returned null".into()))
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        self.factory.take();
        if let Some(exit) = self.exit_fn.take() {
            // SAFETY: The library is still loaded; it is dropped below.
            if !unsafe { exit() } {
                warn!("Plugin module exit point reported failure");
            }
        }
        if let Some(library) = self.library.take() {
            drop(library);
            debug!("Unloaded plugin module");
        }
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("path", &self.path)
            .field("loaded", &self.library.is_some())
            .finish()
    }
}

// =============================================================================
// Platform specifics
// =============================================================================

/// Resolve the binary inside a `.vst3` bundle for the running platform.
///
/// Paths that are not directories are returned unchanged.
pub fn bundle_binary_path(bundle: &Path) -> PathBuf {
    if !bundle.is_dir() {
        return bundle.to_path_buf();
    }
    let stem = bundle
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned();
    let contents = bundle.join("Contents");

    #[cfg(target_os = "macos")]
    {
        contents.join("MacOS").join(stem)
    }
    #[cfg(target_os = "windows")]
    {
        let arch = match std::env::consts::ARCH {
            "aarch64" => "arm64",
            other => other,
        };
        contents
            .join(format!("{arch}-win"))
            .join(format!("{stem}.vst3"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        contents
            .join(format!("{}-linux", std::env::consts::ARCH))
            .join(format!("{stem}.so"))
    }
}

#[cfg(target_os = "windows")]
fn call_entry(library: &Library) -> HostResult<()> {
    // SAFETY: InitDll takes no arguments and returns bool.
    match unsafe { library.get::<unsafe extern "C" fn() -> bool>(b"InitDll") } {
        // SAFETY: The library is loaded for the duration of the call.
        Ok(entry) if !unsafe { entry() } => {
            Err(HostError::Load("InitDll returned false".into()))
        }
        Ok(_) => Ok(()),
        Err(_) => {
            debug!("Plugin module exports no InitDll");
            Ok(())
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn call_entry(library: &Library) -> HostResult<()> {
    #[cfg(target_os = "macos")]
    const ENTRY_SYMBOL: &[u8] = b"bundleEntry";
    #[cfg(not(target_os = "macos"))]
    const ENTRY_SYMBOL: &[u8] = b"ModuleEntry";

    // SAFETY: The entry point takes a platform handle and returns bool.
    match unsafe { library.get::<unsafe extern "C" fn(*mut c_void) -> bool>(ENTRY_SYMBOL) } {
        // SAFETY: A null handle is accepted by the SDK entry implementations.
        Ok(entry) if !unsafe { entry(std::ptr::null_mut()) } => Err(HostError::Load(format!(
            "{} returned false",
            String::from_utf8_lossy(ENTRY_SYMBOL)
        ))),
        Ok(_) => Ok(()),
        Err(_) => {
            debug!("Plugin module exports no entry point");
            Ok(())
        }
    }
}

/// Render a class ID as the usual 32-digit hex string.
pub fn format_cid(cid: &TUID) -> String {
    cid.iter()
        .map(|&b: &c_char| format!("{:02X}", b as u8))
        .collect()
}
