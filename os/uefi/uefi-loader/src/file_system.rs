use alloc::vec;
use alloc::vec::Vec;
use log::warn;
use uefi::proto::media::file::{File, FileAttribute, FileHandle, FileMode, RegularFile};
use uefi::{CStr16, Status, boot};

/// Read a whole file from the volume the loader was started from.
///
/// # Errors
/// [`Status::NOT_FOUND`] if `path` does not exist or is a directory,
/// the firmware's status for any other failure.
pub fn load_file(path: &CStr16) -> Result<Vec<u8>, Status> {
    let mut sfs = boot::get_image_file_system(boot::image_handle()).map_err(|e| {
        warn!("no file system on the boot device: {e:?}");
        e.status()
    })?;
    let mut volume = sfs.open_volume().map_err(|e| {
        warn!("cannot open the boot volume: {e:?}");
        e.status()
    })?;

    let mut file = volume
        .open(path, FileMode::Read, FileAttribute::empty())
        .ok()
        .and_then(FileHandle::into_regular_file)
        .ok_or(Status::NOT_FOUND)?;

    file.set_position(RegularFile::END_OF_FILE)
        .map_err(|e| e.status())?;
    let size = file.get_position().map_err(|e| e.status())?;
    file.set_position(0).map_err(|e| e.status())?;
    let size = usize::try_from(size).map_err(|_| Status::BAD_BUFFER_SIZE)?;

    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let read = file.read(&mut buf[filled..]).map_err(|e| e.status())?;
        if read == 0 {
            warn!("{path}: short read, {filled} of {size} bytes");
            return Err(Status::END_OF_FILE);
        }
        filled += read;
    }

    Ok(buf)
}
