//! Directory packing convenience: walk a tree and emit a ustar/PAX archive.

use crate::error::Result;
use crate::writer::TarWriter;
use std::fs;
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// Pack every entry under `src` into `writer` as a ustar/PAX archive,
/// rooted at `src` (so `src` itself contributes no path component).
///
/// Directories are visited in sorted order for reproducible output.
pub fn pack_dir<W: Write>(src: &Path, writer: W) -> Result<()> {
    let mut tar = TarWriter::new(writer);
    walk(src, Path::new(""), &mut tar)?;
    tar.finalize()
}

fn walk<W: Write>(base: &Path, rel: &Path, tar: &mut TarWriter<W>) -> Result<()> {
    let dir = base.join(rel);
    let mut children: Vec<fs::DirEntry> = fs::read_dir(&dir)?.collect::<std::io::Result<_>>()?;
    children.sort_by_key(|e| e.file_name());

    for entry in children {
        let name = entry.file_name();
        let child_rel = rel.join(&name);
        let archive_path = child_rel.to_string_lossy().replace('\\', "/");
        let metadata = entry.metadata()?;
        let mode = metadata.mode() & 0o7777;
        let uid = metadata.uid();
        let gid = metadata.gid();
        let mtime = metadata.mtime();

        if metadata.is_dir() {
            tar.write_directory(&archive_path, mode, uid, gid, mtime, "", "")?;
            walk(base, &child_rel, tar)?;
        } else if metadata.file_type().is_symlink() {
            let target = fs::read_link(entry.path())?;
            tar.write_symlink(&archive_path, &target.to_string_lossy(), mode, uid, gid, mtime, "", "")?;
        } else {
            let file = fs::File::open(entry.path())?;
            tar.write_file_from(&archive_path, file, metadata.size(), mode, uid, gid, mtime, "", "")?;
        }
    }
    Ok(())
}
