use std::ffi::OsString;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use exif::experimental::Writer;
use exif::{Context, Exif, Field, In, Rational, Reader, Tag, Value};
use tracing::info;

use crate::error::{Error, Result};
use crate::ffmpeg;
use crate::jpeg;
use crate::media::{self, MediaKind};
use crate::writer;

/// Offsets the writer regenerates from the data it lays out
const POINTER_TAGS: [Tag; 5] = [
    Tag::ExifIFDPointer,
    Tag::GPSInfoIFDPointer,
    Tag::InteropIFDPointer,
    Tag::JPEGInterchangeFormat,
    Tag::JPEGInterchangeFormatLength,
];

/// Attaches location and capture time to finished media.
#[derive(Debug, Clone)]
pub struct MetadataWriter {
    ffmpeg: PathBuf,
}

impl MetadataWriter {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Write GPS coordinates. Returns false when the container has no GPS
    /// support here and nothing was written.
    pub fn write_gps(&self, path: &Path, kind: MediaKind, lat: f64, lon: f64) -> Result<bool> {
        match kind {
            MediaKind::Video => self.write_video_gps(path, lat, lon).map(|()| true),
            MediaKind::Image if media::is_jpeg(path) => {
                write_image_gps(path, lat, lon).map(|()| true)
            }
            _ => Ok(false),
        }
    }

    /// Re-mux with a `location` tag into a side file, then swap it in. The
    /// original is untouched until the new file is complete.
    pub fn write_video_gps(&self, path: &Path, lat: f64, lon: f64) -> Result<()> {
        let location = iso6709(lat, lon);
        let ext = media::extension(path);
        let suffix = if ext.is_empty() {
            ".mp4".to_string()
        } else {
            format!(".{ext}")
        };
        let tmp = tempfile::Builder::new()
            .prefix(".gps-")
            .suffix(&suffix)
            .tempfile_in(writer::parent_dir(path))?;

        ffmpeg::run(&self.ffmpeg, &video_gps_args(path, &location, tmp.path()))
            .map_err(|reason| Error::metadata(path, reason))?;

        tmp.persist(path).map_err(|e| Error::metadata(path, e.error))?;
        info!("Wrote location {location} to {}", path.display());
        Ok(())
    }
}

/// ffmpeg arguments: copy every stream, keep existing metadata, set `location`
pub fn video_gps_args(input: &Path, location: &str, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-metadata".into(),
        format!("location={location}").into(),
        "-c".into(),
        "copy".into(),
        "-map_metadata".into(),
        "0".into(),
        output.into(),
    ]
}

/// ISO 6709 short form, e.g. `-31.9547+115.8602/`
pub fn iso6709(lat: f64, lon: f64) -> String {
    format!("{lat:+08.4}{lon:+09.4}/")
}

/// Decimal degrees to (deg/1, min/1, sec/100) rationals. The sign is
/// carried separately in the N/S or E/W reference.
pub fn decimal_to_dms(value: f64) -> [Rational; 3] {
    let abs = value.abs();
    let degrees = abs.trunc();
    let minutes = ((abs - degrees) * 60.0).trunc();
    let centiseconds = ((abs - degrees - minutes / 60.0) * 3600.0 * 100.0).round();
    [
        Rational {
            num: degrees as u32,
            denom: 1,
        },
        Rational {
            num: minutes as u32,
            denom: 1,
        },
        Rational {
            num: centiseconds as u32,
            denom: 100,
        },
    ]
}

fn dms_to_decimal(dms: &[Rational]) -> Option<f64> {
    let [d, m, s] = dms else { return None };
    Some(d.to_f64() + m.to_f64() / 60.0 + s.to_f64() / 3600.0)
}

fn ascii(s: &str) -> Value {
    Value::Ascii(vec![s.as_bytes().to_vec()])
}

/// Replace the GPS block of a JPEG, keeping every other primary-image tag.
pub fn write_image_gps(path: &Path, lat: f64, lon: f64) -> Result<()> {
    let bytes = fs::read(path)?;
    let existing = jpeg::exif_block(&bytes)
        .map_err(|e| Error::metadata(path, e))?
        .map(|tiff| Reader::new().read_raw(tiff.to_vec()))
        .transpose()
        .map_err(|e| Error::metadata(path, e))?;

    let gps = [
        Field {
            tag: Tag::GPSLatitudeRef,
            ifd_num: In::PRIMARY,
            value: ascii(if lat >= 0.0 { "N" } else { "S" }),
        },
        Field {
            tag: Tag::GPSLatitude,
            ifd_num: In::PRIMARY,
            value: Value::Rational(decimal_to_dms(lat).to_vec()),
        },
        Field {
            tag: Tag::GPSLongitudeRef,
            ifd_num: In::PRIMARY,
            value: ascii(if lon >= 0.0 { "E" } else { "W" }),
        },
        Field {
            tag: Tag::GPSLongitude,
            ifd_num: In::PRIMARY,
            value: Value::Rational(decimal_to_dms(lon).to_vec()),
        },
    ];

    let mut writer = Writer::new();
    if let Some(exif) = &existing {
        for field in exif.fields().filter(|f| keeps(f)) {
            writer.push_field(field);
        }
        if let Some(thumbnail) = thumbnail_jpeg(exif) {
            writer.set_jpeg(thumbnail, In::THUMBNAIL);
        }
    }
    for field in &gps {
        writer.push_field(field);
    }

    let little_endian = existing.as_ref().is_some_and(|e| e.little_endian());
    let mut tiff = Cursor::new(Vec::new());
    writer
        .write(&mut tiff, little_endian)
        .map_err(|e| Error::metadata(path, e))?;

    let updated =
        jpeg::with_exif_block(&bytes, tiff.get_ref()).map_err(|e| Error::metadata(path, e))?;
    replace_contents(path, &updated)?;
    info!("Wrote GPS {lat}, {lon} to {}", path.display());
    Ok(())
}

/// Fields carried over into the rewritten block: primary and thumbnail
/// IFDs, old GPS dropped. Values of unknown TIFF type cannot be written
/// back by kamadak-exif and are left out.
fn keeps(field: &Field) -> bool {
    (field.ifd_num == In::PRIMARY || field.ifd_num == In::THUMBNAIL)
        && field.tag.context() != Context::Gps
        && !POINTER_TAGS.contains(&field.tag)
        && !matches!(field.value, Value::Unknown(..))
}

/// Embedded thumbnail JPEG of the 1st IFD, sliced out of the TIFF buffer
fn thumbnail_jpeg(exif: &Exif) -> Option<&[u8]> {
    let offset = exif
        .get_field(Tag::JPEGInterchangeFormat, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let len = exif
        .get_field(Tag::JPEGInterchangeFormatLength, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    exif.buf().get(offset..offset.checked_add(len)?)
}

/// (lat, lon) from a JPEG's GPS tags, None if it has none
pub fn read_image_gps(path: &Path) -> Result<Option<(f64, f64)>> {
    let bytes = fs::read(path)?;
    let Some(tiff) = jpeg::exif_block(&bytes).map_err(|e| Error::metadata(path, e))? else {
        return Ok(None);
    };
    let exif = Reader::new()
        .read_raw(tiff.to_vec())
        .map_err(|e| Error::metadata(path, e))?;

    let coordinate = |value_tag: Tag, ref_tag: Tag, negative: u8| -> Option<f64> {
        let value = match &exif.get_field(value_tag, In::PRIMARY)?.value {
            Value::Rational(v) => dms_to_decimal(v)?,
            _ => return None,
        };
        let is_negative = match &exif.get_field(ref_tag, In::PRIMARY)?.value {
            Value::Ascii(v) => v.first().and_then(|s| s.first()) == Some(&negative),
            _ => false,
        };
        Some(if is_negative { -value } else { value })
    };

    Ok(coordinate(Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S')
        .zip(coordinate(Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W')))
}

/// Set access and modification time to the capture time
pub fn set_capture_time(path: &Path, captured: DateTime<Utc>) -> Result<()> {
    let ft = filetime::FileTime::from_unix_time(captured.timestamp(), 0);
    filetime::set_file_times(path, ft, ft).map_err(|e| Error::metadata(path, e))
}

/// Write to a sibling temp file and rename over `path`
fn replace_contents(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".exif-")
        .tempfile_in(writer::parent_dir(path))?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::metadata(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use tempfile::tempdir;

    const TOLERANCE: f64 = 1.0 / 360_000.0;

    #[test]
    fn test_iso6709() {
        assert_eq!(iso6709(-31.9547, 115.8602), "-31.9547+115.8602/");
        assert_eq!(iso6709(5.5, -7.25), "+05.5000-007.2500/");
        assert_eq!(iso6709(0.0, 0.0), "+00.0000+000.0000/");
    }

    #[test]
    fn test_decimal_to_dms() {
        let dms = decimal_to_dms(-31.9547);
        assert_eq!((dms[0].num, dms[0].denom), (31, 1));
        assert_eq!((dms[1].num, dms[1].denom), (57, 1));
        // 0.9547 deg = 57 min + 16.92 sec
        assert_eq!((dms[2].num, dms[2].denom), (1692, 100));
    }

    #[test]
    fn test_video_gps_args() {
        let args = video_gps_args(Path::new("in.mp4"), "+01.0000+002.0000/", Path::new("out.mp4"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            [
                "-y", "-i", "in.mp4", "-metadata", "location=+01.0000+002.0000/", "-c", "copy",
                "-map_metadata", "0", "out.mp4"
            ]
        );
    }

    #[test]
    fn test_gps_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photo.jpg");

        for (lat, lon) in [
            (-31.9547, 115.8602),
            (40.7128, -74.006),
            (0.0, 0.0),
            (89.99999, -179.99999),
        ] {
            testutil::write_jpeg(&path, 8, 8, [120, 80, 40], None);
            write_image_gps(&path, lat, lon).unwrap();
            let (rlat, rlon) = read_image_gps(&path).unwrap().unwrap();
            assert!((rlat - lat).abs() <= TOLERANCE, "lat {lat} read back as {rlat}");
            assert!((rlon - lon).abs() <= TOLERANCE, "lon {lon} read back as {rlon}");
            image::open(&path).unwrap();
        }
    }

    #[test]
    fn test_gps_block_replaced_other_tags_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        let make = Field {
            tag: Tag::Make,
            ifd_num: In::PRIMARY,
            value: ascii("TestCam"),
        };
        let altitude = Field {
            tag: Tag::GPSAltitude,
            ifd_num: In::PRIMARY,
            value: Value::Rational(vec![Rational { num: 100, denom: 1 }]),
        };
        testutil::write_jpeg(&path, 8, 8, [0, 0, 0], Some(&[&make, &altitude]));

        write_image_gps(&path, 10.5, 20.25).unwrap();

        let bytes = fs::read(&path).unwrap();
        let tiff = jpeg::exif_block(&bytes).unwrap().unwrap();
        let exif = Reader::new().read_raw(tiff.to_vec()).unwrap();
        assert_eq!(testutil::ascii_field(&exif, Tag::Make).as_deref(), Some("TestCam"));
        assert!(exif.get_field(Tag::GPSAltitude, In::PRIMARY).is_none());
        assert_eq!(read_image_gps(&path).unwrap().map(|(a, _)| a > 10.49), Some(true));
    }

    #[test]
    fn test_thumbnail_ifd_survives_gps_rewrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        let make = Field {
            tag: Tag::Make,
            ifd_num: In::PRIMARY,
            value: ascii("TestCam"),
        };
        let description = Field {
            tag: Tag::ImageDescription,
            ifd_num: In::THUMBNAIL,
            value: ascii("preview"),
        };
        let thumbnail = testutil::encode_jpeg(4, 4, [9, 9, 9]);
        testutil::write_jpeg_exif(&path, 16, 16, [0, 0, 0], &[&make, &description], Some(&thumbnail));

        let thumbnail_fields = |path: &Path| {
            let bytes = fs::read(path).unwrap();
            let tiff = jpeg::exif_block(&bytes).unwrap().unwrap().to_vec();
            let exif = Reader::new().read_raw(tiff).unwrap();
            let count = exif.fields().filter(|f| f.ifd_num == In::THUMBNAIL).count();
            (count, thumbnail_jpeg(&exif).map(<[u8]>::to_vec))
        };
        let (before, _) = thumbnail_fields(&path);
        assert_eq!(before, 3);

        write_image_gps(&path, 1.0, 2.0).unwrap();

        let (after, embedded) = thumbnail_fields(&path);
        assert_eq!(after, before);
        assert_eq!(embedded, Some(thumbnail));

        let bytes = fs::read(&path).unwrap();
        let exif = Reader::new()
            .read_raw(jpeg::exif_block(&bytes).unwrap().unwrap().to_vec())
            .unwrap();
        assert_eq!(testutil::ascii_field(&exif, Tag::Make).as_deref(), Some("TestCam"));
        match &exif.get_field(Tag::ImageDescription, In::THUMBNAIL).unwrap().value {
            Value::Ascii(v) => assert_eq!(v[0], b"preview"),
            other => panic!("unexpected value {other:?}"),
        }
        assert!(read_image_gps(&path).unwrap().is_some());
    }

    #[test]
    fn test_write_gps_skips_unsupported() {
        let dir = tempdir().unwrap();
        let png = dir.path().join("a.png");
        image::RgbaImage::new(2, 2).save(&png).unwrap();
        let before = fs::read(&png).unwrap();

        let writer = MetadataWriter::new("ffmpeg");
        assert!(!writer.write_gps(&png, MediaKind::Image, 1.0, 2.0).unwrap());
        assert!(!writer.write_gps(&png, MediaKind::Other, 1.0, 2.0).unwrap());
        assert_eq!(fs::read(&png).unwrap(), before);
    }

    #[test]
    fn test_video_gps_failure_keeps_original() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        fs::write(&video, b"not really a video").unwrap();

        let writer = MetadataWriter::new(dir.path().join("missing-ffmpeg"));
        let err = writer.write_video_gps(&video, 1.0, 2.0).unwrap_err();
        assert!(matches!(err, Error::MetadataWrite { .. }));
        assert_eq!(fs::read(&video).unwrap(), b"not really a video");
        // Side file cleaned up
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_video_gps_replaces_original() {
        let tools = tempdir().unwrap();
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        fs::write(&video, b"frames").unwrap();

        let writer = MetadataWriter::new(testutil::stub_ffmpeg(tools.path()));
        assert!(writer.write_gps(&video, MediaKind::Video, -31.9547, 115.8602).unwrap());

        assert_eq!(fs::read(&video).unwrap(), b"framesstub");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_set_capture_time() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, b"x").unwrap();
        let when = crate::date::parse_capture_date("2021-03-04 05:06:07 UTC").unwrap();
        set_capture_time(&path, when).unwrap();
        let meta = fs::metadata(&path).unwrap();
        let mtime = filetime::FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime.unix_seconds(), when.timestamp());
    }
}
