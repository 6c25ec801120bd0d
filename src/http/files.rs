//! # Archivos Estáticos
//! src/http/files.rs
//!
//! El armado de respuestas no toca el filesystem directamente: pregunta a
//! un `FileSource` por los metadatos del recurso y le pide los bytes. La
//! implementación real (`DiskFiles`) mapea el archivo en memoria con
//! `mmap` para que el segundo segmento del `writev` salga sin copias.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

/// Bit de lectura para "otros" (`S_IROTH`)
const OTHERS_READ: u32 = 0o004;

/// Metadatos del recurso pedido
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileInfo {
    pub exists: bool,
    pub is_dir: bool,
    pub readable: bool,
    pub size: usize,
}

impl FileInfo {
    pub fn missing() -> Self {
        Self::default()
    }
}

/// Contenido de un recurso listo para enviarse
#[derive(Debug)]
pub enum FileBody {
    Mapped(MappedFile),
    Bytes(Arc<[u8]>),
}

impl FileBody {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileBody::Mapped(map) => map.as_slice(),
            FileBody::Bytes(bytes) => &bytes[..],
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Origen de los archivos que sirve el servidor
pub trait FileSource: Send + Sync {
    /// Metadatos de `path` relativo a `base`
    fn inspect(&self, base: &Path, path: &str) -> FileInfo;

    /// Abre `path` y retorna su contenido completo
    fn open(&self, base: &Path, path: &str) -> io::Result<FileBody>;
}

/// Archivos del disco, mapeados con `mmap`
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFiles;

impl DiskFiles {
    fn resolve(base: &Path, path: &str) -> PathBuf {
        base.join(path.trim_start_matches('/'))
    }
}

impl FileSource for DiskFiles {
    fn inspect(&self, base: &Path, path: &str) -> FileInfo {
        // Nada de salir del directorio base con `..`
        if path.split('/').any(|segment| segment == "..") {
            return FileInfo::missing();
        }
        match std::fs::metadata(Self::resolve(base, path)) {
            Ok(meta) => FileInfo {
                exists: true,
                is_dir: meta.is_dir(),
                readable: meta.permissions().mode() & OTHERS_READ != 0,
                size: meta.len() as usize,
            },
            Err(_) => FileInfo::missing(),
        }
    }

    fn open(&self, base: &Path, path: &str) -> io::Result<FileBody> {
        let file = File::open(Self::resolve(base, path))?;
        Ok(FileBody::Mapped(MappedFile::map(&file)?))
    }
}

/// Región de solo lectura mapeada con `mmap`; se libera con `munmap` al soltarla
#[derive(Debug)]
pub struct MappedFile {
    ptr: Option<NonNull<u8>>,
    len: usize,
}

// El mapeo es privado y de solo lectura
unsafe impl Send for MappedFile {}
unsafe impl Sync for MappedFile {}

impl MappedFile {
    /// Mapea el archivo completo; un archivo vacío no crea mapeo
    pub fn map(file: &File) -> io::Result<Self> {
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Ok(Self { ptr: None, len: 0 });
        }

        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            ptr: NonNull::new(addr as *mut u8),
            len,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        match self.ptr {
            Some(ptr) => unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.len) },
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            unsafe {
                libc::munmap(ptr.as_ptr() as *mut libc::c_void, self.len);
            }
        }
    }
}
