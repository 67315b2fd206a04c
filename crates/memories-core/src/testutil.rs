//! Fixture builders shared by the unit tests.

use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::Path;

use exif::experimental::Writer;
use exif::{Exif, Field, In, Tag, Value};

use crate::jpeg;

/// Solid-colour JPEG, optionally carrying an Exif block built from `fields`
pub fn write_jpeg(path: &Path, width: u32, height: u32, rgb: [u8; 3], fields: Option<&[&Field]>) {
    match fields {
        Some(fields) => write_jpeg_exif(path, width, height, rgb, fields, None),
        None => fs::write(path, encode_jpeg(width, height, rgb)).unwrap(),
    }
}

pub fn encode_jpeg(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut bytes = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, 95)
        .encode_image(&img)
        .unwrap();
    bytes
}

/// JPEG whose Exif holds `fields` and, if given, an embedded thumbnail
pub fn write_jpeg_exif(
    path: &Path,
    width: u32,
    height: u32,
    rgb: [u8; 3],
    fields: &[&Field],
    thumbnail: Option<&[u8]>,
) {
    let mut writer = Writer::new();
    for f in fields {
        writer.push_field(f);
    }
    if let Some(jpeg) = thumbnail {
        writer.set_jpeg(jpeg, In::THUMBNAIL);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let bytes = jpeg::with_exif_block(&encode_jpeg(width, height, rgb), tiff.get_ref()).unwrap();
    fs::write(path, bytes).unwrap();
}

pub fn write_png(path: &Path, width: u32, height: u32, rgba: [u8; 4]) {
    image::RgbaImage::from_pixel(width, height, image::Rgba(rgba))
        .save(path)
        .unwrap();
}

pub fn ascii_field(exif: &Exif, tag: Tag) -> Option<String> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(v) => v.first().map(|s| String::from_utf8_lossy(s).into_owned()),
        _ => None,
    }
}

pub fn set_mtime(path: &Path, unix_seconds: i64) {
    let ft = filetime::FileTime::from_unix_time(unix_seconds, 0);
    filetime::set_file_mtime(path, ft).unwrap();
}

pub fn mtime(path: &Path) -> i64 {
    let meta = fs::metadata(path).unwrap();
    filetime::FileTime::from_last_modification_time(&meta).unix_seconds()
}

/// Zip with the given (name, contents) entries
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, contents) in entries {
        zip.start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(contents).unwrap();
    }
    zip.finish().unwrap();
}

/// Stand-in for ffmpeg: writes the first `-i` input plus a `stub` trailer to
/// the last argument and exits 0.
#[cfg(unix)]
pub fn stub_ffmpeg(dir: &Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-ffmpeg");
    fs::write(
        &path,
        "#!/bin/sh\n\
         in=\"\"\n\
         while [ $# -gt 1 ]; do\n\
         \x20 if [ \"$1\" = \"-i\" ] && [ -z \"$in\" ]; then in=\"$2\"; fi\n\
         \x20 shift\n\
         done\n\
         cat \"$in\" > \"$1\" && printf stub >> \"$1\"\n",
    )
    .unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
