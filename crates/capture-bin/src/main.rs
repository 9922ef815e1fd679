use capture_client::capture_types::{
    CapturedPacketDyn, DeliveredFrameDyn, PixelLayout, StreamCameraDynMut, StreamCameraOptions,
};
use capture_client::{load, CaptureClientError};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use turbojpeg::{Compressor, Image, PixelFormat, Subsamp};

type BoxError = Box<dyn std::error::Error>;

fn get_jpeg_buffer(
    pixels: &[u8],
    width: u32,
    height: u32,
    layout: PixelLayout,
) -> Result<Vec<u8>, std::io::Error> {
    let to_io = |e: turbojpeg::Error| {
        std::io::Error::new(std::io::ErrorKind::Other, format!("TurboJPEG error: {}", e))
    };

    let mut compressor = Compressor::new().map_err(to_io)?;
    let format = match layout {
        PixelLayout::Rgba => PixelFormat::RGBA,
        PixelLayout::Rgb24 => PixelFormat::RGB,
        PixelLayout::Gray8 => {
            compressor.set_subsamp(Subsamp::Gray).map_err(to_io)?;
            PixelFormat::GRAY
        }
    };

    let image = Image {
        pixels,
        width: width as usize,
        pitch: width as usize * layout.bytes_per_pixel(),
        height: height as usize,
        format,
    };
    compressor.compress_to_vec(image).map_err(to_io)
}

fn write_png(
    path: &Path,
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    layout: PixelLayout,
) -> Result<(), BoxError> {
    let short = || format!("frame buffer too short for {}x{}", width, height);
    match layout {
        PixelLayout::Rgba => image::RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(short)?
            .save(path)?,
        PixelLayout::Rgb24 => image::RgbImage::from_raw(width, height, pixels)
            .ok_or_else(short)?
            .save(path)?,
        PixelLayout::Gray8 => image::GrayImage::from_raw(width, height, pixels)
            .ok_or_else(short)?
            .save(path)?,
    }
    Ok(())
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotFormat {
    Png,
    Jpeg,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Print the coded packets read from a source.
    Packets {
        source: String,
        #[arg(long, default_value = "rtpRtsp")]
        method: String,
        #[arg(long, default_value = "")]
        options: String,
        #[arg(long, default_value_t = 100)]
        count: usize,
    },
    /// Decode frames from a source and write them as images.
    Frames {
        source: String,
        #[arg(long)]
        output_dir: String,
        #[arg(long, default_value = "rtpRtsp")]
        method: String,
        #[arg(long, default_value = "")]
        options: String,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 360)]
        height: u32,
        #[arg(long, default_value = "rgb24")]
        layout: String,
        #[arg(long, default_value_t = 10)]
        count: usize,
        #[arg(long, value_enum, default_value_t = SnapshotFormat::Png)]
        format: SnapshotFormat,
    },
}

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Seconds allowed for connecting to the source.
    #[arg(long, default_value_t = 10, global = true)]
    timeout: u32,
    #[arg(long, global = true)]
    no_hwaccel: bool,
}

fn lib_path() -> PathBuf {
    let lib_name = if cfg!(target_os = "windows") {
        "capture_lib.dll"
    } else if cfg!(target_os = "macos") {
        "libcapture_lib.dylib"
    } else {
        "libcapture_lib.so"
    };

    let default_lib_path = PathBuf::from("./target/debug").join(lib_name);
    std::env::var("CAPTURE_LIB_PATH")
        .map(PathBuf::from)
        .unwrap_or(default_lib_path)
}

fn camera_options(
    cli: &Cli,
    source: &str,
    method: &str,
    options: &str,
    width: u32,
    height: u32,
    pixel_layout: PixelLayout,
) -> StreamCameraOptions {
    StreamCameraOptions {
        source: source.into(),
        method: method.into(),
        options: options.into(),
        width,
        height,
        open_timeout_secs: cli.timeout,
        pixel_layout,
        capture_audio: false,
        // Reopen inline so a lost source blocks instead of spinning on NotReady.
        detached_reopen: false,
        hardware_acceleration: !cli.no_hwaccel,
    }
}

fn main() -> Result<(), BoxError> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    let client = load(&lib_path())?;

    match cli.command.clone() {
        Command::Packets {
            source,
            method,
            options,
            count,
        } => {
            // Packets are passed through untouched; the output size only
            // has to be valid.
            let options =
                camera_options(&cli, &source, &method, &options, 2, 2, PixelLayout::Gray8);
            let mut camera = client.new_stream_camera(options)?;
            let primed: Result<_, _> = camera.prime().into();
            primed.map_err(CaptureClientError::from)?;

            let mut seen = 0;
            while seen < count {
                let captured: Result<_, _> = camera.capture().into();
                match captured {
                    Ok(packet) => {
                        println!(
                            "stream {} video={} pts={} dts={} key={} size={}",
                            packet.get_stream_index(),
                            packet.get_is_video(),
                            packet.get_pts(),
                            packet.get_dts(),
                            packet.get_key_frame(),
                            packet.data_len()
                        );
                        seen += 1;
                    }
                    Err(e) if e.is_fatal() => return Err(CaptureClientError::from(e).into()),
                    Err(e) => warn!("{}", e),
                }
            }
            camera.shutdown();
        }
        Command::Frames {
            source,
            output_dir,
            method,
            options,
            width,
            height,
            layout,
            count,
            format,
        } => {
            let pixel_layout = PixelLayout::from_name(&layout)
                .ok_or_else(|| format!("unknown pixel layout {}", layout))?;

            if !Path::new(&output_dir).exists() {
                fs::create_dir_all(&output_dir)?;
            }

            let options = camera_options(
                &cli,
                &source,
                &method,
                &options,
                width,
                height,
                pixel_layout,
            );
            let mut camera = client.new_stream_camera(options)?;
            let primed: Result<_, _> = camera.prime().into();
            primed.map_err(CaptureClientError::from)?;

            let mut written = 0;
            while written < count {
                let captured: Result<_, _> = camera.capture_frame().into();
                let frame = match captured {
                    Ok(frame) => frame,
                    Err(e) if e.is_fatal() => return Err(CaptureClientError::from(e).into()),
                    Err(e) => {
                        warn!("{}", e);
                        continue;
                    }
                };

                let pixels =
                    unsafe { std::slice::from_raw_parts(frame.data_ptr(), frame.data_len()) };
                let (w, h) = (frame.get_width(), frame.get_height());
                info!("frame {} pts {} ({}x{})", written, frame.get_pts(), w, h);

                if format == SnapshotFormat::Jpeg {
                    let path = Path::new(&output_dir).join(format!("{}.jpeg", written));
                    fs::write(path, get_jpeg_buffer(pixels, w, h, pixel_layout)?)?;
                } else {
                    let path = Path::new(&output_dir).join(format!("{}.png", written));
                    write_png(&path, pixels.to_vec(), w, h, pixel_layout)?;
                }
                written += 1;
            }
            camera.shutdown();
        }
    }
    Ok(())
}
