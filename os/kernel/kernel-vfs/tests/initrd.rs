mod common;

use common::*;
use kernel_vfs::{Dentry, ExtractError, Vfs};
use packer_abi::{ArchiveBuilder, TarError};

fn initrd() -> Vec<u8> {
    let mut tar = ArchiveBuilder::new();
    tar.add_directory("bin").unwrap();
    tar.add_file("bin/init", b"\x7fELF-init").unwrap();
    tar.add_directory("etc/").unwrap();
    tar.add_file("etc/motd", b"welcome\n").unwrap();
    tar.add_directory("dev").unwrap();
    tar.finish()
}

#[test]
fn extracts_members_into_the_root() {
    let mut vfs = Vfs::new();
    let devices = Devices::new(Vec::new());
    assert_eq!(vfs.extract_tar(&initrd(), &devices), Ok(4));

    let (init, _) = exists(&mut vfs, "/bin/init", &devices);
    assert_eq!(read_all(&mut vfs, init, &devices), b"\x7fELF-init");
    let (motd, _) = exists(&mut vfs, "/etc/motd", &devices);
    assert_eq!(read_all(&mut vfs, motd, &devices), b"welcome\n");

    // the existing /dev was kept rather than duplicated
    let root = vfs.root();
    let names: Vec<_> = vfs.children(root).map(Dentry::name).collect();
    assert_eq!(names, ["dev", "sys", "bin", "etc"]);
}

#[test]
fn existing_files_are_not_overwritten() {
    let mut vfs = Vfs::new();
    let devices = Devices::new(Vec::new());
    vfs.extract_tar(&initrd(), &devices).unwrap();
    assert_eq!(vfs.extract_tar(&initrd(), &devices), Err(ExtractError::Exists));
}

#[test]
fn corrupt_archives_are_reported() {
    let mut vfs = Vfs::new();
    let devices = Devices::new(Vec::new());
    let mut tar = initrd();
    tar[148] ^= 0x01;
    assert_eq!(
        vfs.extract_tar(&tar, &devices),
        Err(ExtractError::Archive(TarError::BadChecksum))
    );
}

#[test]
fn members_need_their_parent_directory() {
    let mut vfs = Vfs::new();
    let devices = Devices::new(Vec::new());
    let mut tar = ArchiveBuilder::new();
    tar.add_file("usr/bin/sh", b"sh").unwrap();
    assert!(matches!(
        vfs.extract_tar(&tar.finish(), &devices),
        Err(ExtractError::Path(_))
    ));
}
