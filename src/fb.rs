//! Linux framebuffer device handle. Opens the device, queries its mode via
//! the fbdev ioctls, maps the pixel memory, and packs RGBA8 images into the
//! device's reported channel layout. Writes become visible after an explicit
//! `flush`.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use image::RgbaImage;
use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;
const FBIOGET_FSCREENINFO: libc::c_ulong = 0x4602;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

// Mirrors the kernel fbdev ABI; only a handful of fields are consulted.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
struct FbFixScreeninfo {
    id: [u8; 16],
    smem_start: libc::c_ulong,
    smem_len: u32,
    fb_type: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: libc::c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

#[derive(Debug, Clone, Copy)]
struct Channel {
    offset: u32,
    length: u32,
}

impl From<FbBitfield> for Channel {
    fn from(field: FbBitfield) -> Self {
        Self {
            offset: field.offset,
            length: field.length,
        }
    }
}

/// Pixel packing rules derived from the device's reported mode.
#[derive(Debug, Clone, Copy)]
struct PixelLayout {
    bytes_per_pixel: usize,
    red: Channel,
    green: Channel,
    blue: Channel,
    alpha: Option<Channel>,
}

impl PixelLayout {
    fn from_var(var: &FbVarScreeninfo) -> Result<Self> {
        let bytes_per_pixel = match var.bits_per_pixel {
            16 => 2,
            32 => 4,
            other => bail!("unsupported framebuffer depth: {other} bits per pixel"),
        };
        // Some drivers leave the bitfields unreported; assume the common
        // layout for the depth in that case.
        let unreported =
            var.red.length == 0 && var.green.length == 0 && var.blue.length == 0;
        let (red, green, blue, alpha) = if unreported {
            match bytes_per_pixel {
                2 => (
                    Channel { offset: 11, length: 5 },
                    Channel { offset: 5, length: 6 },
                    Channel { offset: 0, length: 5 },
                    None,
                ),
                _ => (
                    Channel { offset: 16, length: 8 },
                    Channel { offset: 8, length: 8 },
                    Channel { offset: 0, length: 8 },
                    None,
                ),
            }
        } else {
            (
                var.red.into(),
                var.green.into(),
                var.blue.into(),
                (var.transp.length > 0).then(|| var.transp.into()),
            )
        };
        Ok(Self {
            bytes_per_pixel,
            red,
            green,
            blue,
            alpha,
        })
    }

    /// Packs one opaque pixel into the device's bit layout.
    fn pack(&self, r: u8, g: u8, b: u8) -> u32 {
        let mut value =
            channel_bits(r, self.red) | channel_bits(g, self.green) | channel_bits(b, self.blue);
        if let Some(alpha) = self.alpha {
            value |= channel_bits(0xFF, alpha);
        }
        value
    }
}

fn channel_bits(value: u8, channel: Channel) -> u32 {
    let scaled = if channel.length >= 8 {
        (value as u32) << (channel.length - 8)
    } else {
        (value as u32) >> (8 - channel.length)
    };
    scaled << channel.offset
}

/// Exclusive handle to a memory-mapped framebuffer device. Held by the
/// rotation loop for the process lifetime; the mapping is released on drop.
pub struct Framebuffer {
    _file: File,
    map: MmapMut,
    width: u32,
    height: u32,
    line_length: usize,
    origin: (usize, usize),
    layout: PixelLayout,
}

impl Framebuffer {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("opening framebuffer device {}", path.display()))?;

        let mut var: FbVarScreeninfo = unsafe { std::mem::zeroed() };
        if unsafe { libc::ioctl(file.as_raw_fd(), FBIOGET_VSCREENINFO as _, &mut var) } != 0 {
            bail!(
                "querying framebuffer mode for {}: {}",
                path.display(),
                std::io::Error::last_os_error()
            );
        }
        let mut fix: FbFixScreeninfo = unsafe { std::mem::zeroed() };
        if unsafe { libc::ioctl(file.as_raw_fd(), FBIOGET_FSCREENINFO as _, &mut fix) } != 0 {
            bail!(
                "querying framebuffer layout for {}: {}",
                path.display(),
                std::io::Error::last_os_error()
            );
        }

        let layout = PixelLayout::from_var(&var)?;
        ensure!(
            fix.line_length as usize >= var.xres as usize * layout.bytes_per_pixel,
            "framebuffer line length {} too small for {} pixels",
            fix.line_length,
            var.xres
        );

        let map = unsafe { MmapOptions::new().len(fix.smem_len as usize).map_mut(&file) }
            .with_context(|| format!("mapping framebuffer memory for {}", path.display()))?;

        debug!(
            width = var.xres,
            height = var.yres,
            bits_per_pixel = var.bits_per_pixel,
            line_length = fix.line_length,
            "framebuffer opened"
        );

        Ok(Self {
            _file: file,
            map,
            width: var.xres,
            height: var.yres,
            line_length: fix.line_length as usize,
            origin: (var.xoffset as usize, var.yoffset as usize),
            layout,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Straight overwrite of the visible pixel buffer. `image` must already
    /// match the device resolution.
    pub fn blit(&mut self, image: &RgbaImage) -> Result<()> {
        ensure!(
            image.width() == self.width && image.height() == self.height,
            "image is {}x{} but the framebuffer is {}x{}",
            image.width(),
            image.height(),
            self.width,
            self.height
        );
        blit_into(
            &mut self.map,
            self.layout,
            self.line_length,
            self.origin,
            image,
        )
    }

    /// Makes buffered writes visible on the device.
    pub fn flush(&mut self) -> Result<()> {
        self.map.flush().context("flushing framebuffer mapping")
    }
}

fn blit_into(
    buffer: &mut [u8],
    layout: PixelLayout,
    line_length: usize,
    origin: (usize, usize),
    image: &RgbaImage,
) -> Result<()> {
    let bpp = layout.bytes_per_pixel;
    let width = image.width() as usize;
    let height = image.height() as usize;
    if width == 0 || height == 0 {
        return Ok(());
    }
    let end = (origin.1 + height - 1) * line_length + (origin.0 + width) * bpp;
    ensure!(
        end <= buffer.len(),
        "framebuffer mapping of {} bytes too small for {}x{} blit",
        buffer.len(),
        width,
        height
    );

    for (y, row) in image.rows().enumerate() {
        let start = (origin.1 + y) * line_length + origin.0 * bpp;
        let line = &mut buffer[start..start + width * bpp];
        for (x, pixel) in row.enumerate() {
            let packed = layout.pack(pixel[0], pixel[1], pixel[2]).to_le_bytes();
            line[x * bpp..(x + 1) * bpp].copy_from_slice(&packed[..bpp]);
        }
    }
    Ok(())
}
