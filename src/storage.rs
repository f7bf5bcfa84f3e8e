use std::{
    cell::{RefCell, RefMut},
    io::{self, Read, Seek, SeekFrom, Write},
    rc::Rc,
};

use sdcard::{BlockDevice, SdDeviceError, SD_SECTOR_SIZE};

/// Byte stream over a sector device, as consumed by the FAT library.
///
/// Holds one sector of read cache. Writes go straight to the card; partial
/// sectors are read, patched and written back. The card is initialized on the
/// first access.
pub struct BlockStorage<D> {
    device: Rc<RefCell<D>>,
    pos: u64,
    cache: [u8; SD_SECTOR_SIZE],
    cached_lba: Option<u32>,
}

impl<D: BlockDevice> BlockStorage<D> {
    pub fn new(device: Rc<RefCell<D>>) -> Self {
        Self {
            device,
            pos: 0,
            cache: [0; SD_SECTOR_SIZE],
            cached_lba: None,
        }
    }

    /// Card size in bytes. A card only knows its size once initialized.
    fn capacity(&self) -> io::Result<u64> {
        let device = borrow_device(&self.device)?;
        Ok(device.sector_count() as u64 * SD_SECTOR_SIZE as u64)
    }

    fn load_sector(&mut self, lba: u32) -> io::Result<()> {
        if self.cached_lba == Some(lba) {
            return Ok(());
        }
        self.cached_lba = None;
        borrow_device(&self.device)?
            .read_sector(lba, &mut self.cache)
            .map_err(device_io_error)?;
        self.cached_lba = Some(lba);
        Ok(())
    }

    fn store_sector(&mut self, lba: u32) -> io::Result<()> {
        let result = borrow_device(&self.device)?.write_sector(lba, &self.cache);
        if let Err(err) = result {
            self.cached_lba = None;
            return Err(device_io_error(err));
        }
        self.cached_lba = Some(lba);
        Ok(())
    }

    /// Sector index and in-sector offset of the current position.
    fn locate(&self) -> io::Result<(u32, usize)> {
        let lba = u32::try_from(self.pos / SD_SECTOR_SIZE as u64).map_err(|_| {
            device_io_error(SdDeviceError::OutOfRange { lba: u32::MAX })
        })?;
        Ok((lba, (self.pos % SD_SECTOR_SIZE as u64) as usize))
    }
}

impl<D: BlockDevice> Read for BlockStorage<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let capacity = self.capacity()?;
        let mut done = 0usize;
        while done < buf.len() && self.pos < capacity {
            let (lba, offset) = self.locate()?;
            let left_on_card = (capacity - self.pos) as usize;
            let n = (SD_SECTOR_SIZE - offset)
                .min(buf.len() - done)
                .min(left_on_card);
            self.load_sector(lba)?;
            buf[done..done + n].copy_from_slice(&self.cache[offset..offset + n]);
            done += n;
            self.pos += n as u64;
        }
        Ok(done)
    }
}

impl<D: BlockDevice> Write for BlockStorage<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let capacity = self.capacity()?;
        if !buf.is_empty() && self.pos >= capacity {
            let (lba, _) = self.locate()?;
            return Err(device_io_error(SdDeviceError::OutOfRange { lba }));
        }
        let mut done = 0usize;
        while done < buf.len() && self.pos < capacity {
            let (lba, offset) = self.locate()?;
            let left_on_card = (capacity - self.pos) as usize;
            let n = (SD_SECTOR_SIZE - offset)
                .min(buf.len() - done)
                .min(left_on_card);
            if n < SD_SECTOR_SIZE {
                self.load_sector(lba)?;
            }
            self.cache[offset..offset + n].copy_from_slice(&buf[done..done + n]);
            self.store_sector(lba)?;
            done += n;
            self.pos += n as u64;
        }
        Ok(done)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut device = self
            .device
            .try_borrow_mut()
            .map_err(|_| device_io_error(SdDeviceError::Busy))?;
        if !device.is_initialized() {
            return Ok(());
        }
        device.flush().map_err(device_io_error)
    }
}

impl<D: BlockDevice> Seek for BlockStorage<D> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.capacity()?.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

fn borrow_device<D: BlockDevice>(device: &RefCell<D>) -> io::Result<RefMut<'_, D>> {
    let mut device = device
        .try_borrow_mut()
        .map_err(|_| device_io_error(SdDeviceError::Busy))?;
    if !device.is_initialized() {
        match device.init() {
            Ok(()) => log::debug!("sdfat: card_init_ok sectors={}", device.sector_count()),
            Err(err) => {
                log::warn!("sdfat: card_init_error err={}", err.label());
                return Err(device_io_error(err));
            }
        }
    }
    Ok(device)
}

pub(crate) fn device_io_error(err: SdDeviceError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}
