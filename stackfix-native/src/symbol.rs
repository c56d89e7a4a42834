#[cfg(unix)]
use core::ffi::{c_void, CStr};

/// What `dladdr` and the image's symbol table know about an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    /// Start of the enclosing function, if any symbol table covers it.
    pub start: Option<usize>,
    pub module_path: String,
    pub module_base: usize,
}

impl SymbolInfo {
    pub fn module_name(&self) -> &str {
        basename(&self.module_path)
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Resolve which symbol and image an address belongs to.
///
/// `dladdr` only sees dynamic symbols; for everything else (private
/// functions, most of an executable) the start comes from the image's
/// static symbol table.
#[cfg(unix)]
pub fn resolve(address: usize) -> Option<SymbolInfo> {
    if address == 0 {
        return None;
    }
    unsafe {
        let mut info: libc::Dl_info = core::mem::zeroed();
        if libc::dladdr(address as *const c_void, &mut info) == 0 {
            return None;
        }
        if info.dli_fname.is_null() {
            return None;
        }
        let mut module_path = CStr::from_ptr(info.dli_fname).to_string_lossy().into_owned();
        let module_base = info.dli_fbase as usize;
        if module_path.is_empty() {
            // musl leaves the main program unnamed.
            if let Ok(exe) = std::env::current_exe() {
                module_path = exe.to_string_lossy().into_owned();
            }
        }
        let start = if info.dli_saddr.is_null() {
            symtab::enclosing_start(&module_path, module_base, address)
        } else {
            Some(info.dli_saddr as usize)
        };
        Some(SymbolInfo {
            start,
            module_path,
            module_base,
        })
    }
}

#[cfg(target_os = "linux")]
mod symtab {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use log::debug;
    use object::{Object, ObjectKind, ObjectSymbol, SymbolKind};

    /// Function extents of one image, sorted by start.
    struct FunctionTable {
        /// Symbol values are relative to the image's load base.
        relocatable: bool,
        ranges: Vec<(u64, u64)>,
    }

    static TABLES: Mutex<Option<HashMap<String, Option<Arc<FunctionTable>>>>> = Mutex::new(None);

    /// Start of the function containing `address`, from the image's
    /// `.symtab`/`.dynsym`.
    pub(super) fn enclosing_start(path: &str, base: usize, address: usize) -> Option<usize> {
        let table = load(path)?;
        let bias = if table.relocatable { base as u64 } else { 0 };
        let rel = (address as u64).checked_sub(bias)?;

        let idx = table.ranges.partition_point(|(start, _)| *start <= rel);
        let (start, size) = table.ranges[..idx].last()?;
        (rel < start + size).then(|| (start + bias) as usize)
    }

    fn load(path: &str) -> Option<Arc<FunctionTable>> {
        let mut cache = TABLES.lock().unwrap_or_else(|e| e.into_inner());
        let tables = cache.get_or_insert_with(HashMap::new);
        if !tables.contains_key(path) {
            tables.insert(path.to_string(), parse(path).map(Arc::new));
        }
        tables.get(path).cloned().flatten()
    }

    fn parse(path: &str) -> Option<FunctionTable> {
        let data = match std::fs::read(path) {
            Ok(d) => d,
            Err(e) => {
                debug!("Failed to read binary {}: {}", path, e);
                return None;
            }
        };
        let obj = match object::File::parse(&*data) {
            Ok(f) => f,
            Err(e) => {
                debug!("Failed to parse binary {}: {}", path, e);
                return None;
            }
        };

        let mut ranges: Vec<(u64, u64)> = obj
            .symbols()
            .chain(obj.dynamic_symbols())
            .filter(|sym| sym.kind() == SymbolKind::Text && sym.address() != 0 && sym.size() > 0)
            .map(|sym| (sym.address(), sym.size()))
            .collect();
        ranges.sort_unstable();
        ranges.dedup();

        debug!("Parsed {} function symbols from {}", ranges.len(), path);
        Some(FunctionTable {
            relocatable: obj.kind() != ObjectKind::Executable,
            ranges,
        })
    }

}

#[cfg(all(unix, not(target_os = "linux")))]
mod symtab {
    pub(super) fn enclosing_start(_path: &str, _base: usize, _address: usize) -> Option<usize> {
        None
    }
}

#[cfg(not(unix))]
pub fn resolve(_address: usize) -> Option<SymbolInfo> {
    None
}

/// Address of an exported symbol anywhere in the process.
#[cfg(unix)]
pub fn find_global_export(symbol: &str) -> Option<usize> {
    let name = std::ffi::CString::new(symbol).ok()?;
    let addr = unsafe { libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr()) };
    (!addr.is_null()).then_some(addr as usize)
}

#[cfg(not(unix))]
pub fn find_global_export(_symbol: &str) -> Option<usize> {
    None
}
