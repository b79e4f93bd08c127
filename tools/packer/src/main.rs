//! Builds the initial ramdisk: `packer <root_dir> <out.tar>`.
//!
//! Every directory and regular file below `root_dir` becomes a member of a
//! ustar archive, paths relative to `root_dir`, in sorted order with parents
//! before their children. The kernel expects `bin/init` to be present.

use packer_abi::ArchiveBuilder;
use std::path::Path;
use std::{env, fs, io};

fn usage() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "usage: packer <root_dir> <out.tar>")
}

fn walk(builder: &mut ArchiveBuilder, root: &Path, dir: &Path, count: &mut usize) -> io::Result<()> {
    let mut children: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    children.sort_by_key(fs::DirEntry::file_name);

    for child in children {
        let path = child.path();
        let relative = path
            .strip_prefix(root)
            .map_err(io::Error::other)?
            .to_str()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "non UTF-8 path"))?
            .replace('\\', "/");

        let file_type = child.file_type()?;
        if file_type.is_dir() {
            builder.add_directory(&relative).map_err(io::Error::other)?;
            walk(builder, root, &path, count)?;
        } else if file_type.is_file() {
            let bytes = fs::read(&path)?;
            builder.add_file(&relative, &bytes).map_err(io::Error::other)?;
        } else {
            eprintln!("skipping {}", path.display());
            continue;
        }
        *count += 1;
    }
    Ok(())
}

fn main() -> io::Result<()> {
    let mut args = env::args().skip(1);
    let root = args.next().ok_or_else(usage)?;
    let out = args.next().ok_or_else(usage)?;
    let root = Path::new(&root);

    if !root.join("bin").join("init").is_file() {
        eprintln!("warning: {} has no bin/init", root.display());
    }

    let mut builder = ArchiveBuilder::new();
    let mut count = 0;
    walk(&mut builder, root, root, &mut count)?;

    fs::write(&out, builder.finish())?;
    eprintln!("packed {count} entries into {out}");
    Ok(())
}
