use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

/// Encoding of the aligned move pair the fixer looks for:
///
/// ```text
/// 0F 28 44 24 20     movaps xmm0, [rsp+0x20]
/// 66 0F 7F 44 24 40  movdqa [rsp+0x40], xmm0
/// ```
///
/// Both instructions fault when the stack slots end up unaligned, which is
/// what happens once the dll is loaded at an unaligned offset.
pub const ALIGNED_MOVE_SIGNATURE: &[u8] = &[
    0x0F, 0x28, 0x44, 0x24, 0x20, 0x66, 0x0F, 0x7F, 0x44, 0x24, 0x40,
];

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("{} does not exist in the current folder.", .0.display())]
    MissingFile(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PatchError {
    /// Stable exit code for each failure. `Io` is listed for completeness;
    /// in practice it leaves the fixer through anyhow, which exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            PatchError::Io(_) => 1,
            PatchError::MissingFile(_) => 2,
        }
    }
}

/// Rewrite up to two aligned move pairs in the file at `path` into their
/// unaligned forms, in place. Returns the offsets that were rewritten;
/// an empty file is left alone and is not an error.
pub fn patch_file(path: &Path) -> Result<Vec<usize>, PatchError> {
    if !path.exists() {
        return Err(PatchError::MissingFile(path.to_path_buf()));
    }

    let mut file = OpenOptions::new().read(true).write(true).open(path)?;

    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;

    let sites = patch_buffer(&mut buffer);

    // The length never changes, so a plain overwrite from the start is enough.
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&buffer)?;

    Ok(sites)
}

/// Patch the first two signature hits in `buffer`, returning their offsets.
pub fn patch_buffer(buffer: &mut [u8]) -> Vec<usize> {
    let mut sites = Vec::new();

    if let Some(first) = find_signature(buffer, 0) {
        rewrite_unaligned(buffer, first);
        sites.push(first);

        // The second scan restarts at the first hit rather than past it; the
        // rewrite above keeps that position from matching a second time.
        if let Some(second) = find_signature(buffer, first) {
            rewrite_unaligned(buffer, second);
            sites.push(second);
        }
    }

    sites
}

fn find_signature(buffer: &[u8], from: usize) -> Option<usize> {
    buffer[from..]
        .windows(ALIGNED_MOVE_SIGNATURE.len())
        .position(|window| window == ALIGNED_MOVE_SIGNATURE)
        .map(|index| from + index)
}

fn rewrite_unaligned(buffer: &mut [u8], at: usize) {
    info!("found an aligned move pair at offset {at:#x}");

    buffer[at + 1] = 0x10; // movaps -> movups
    buffer[at + 5] = 0xF3; // movdqa -> movdqu
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A buffer of `len` filler bytes with the signature copied in at each
    /// of the given offsets.
    fn buffer_with_sites(len: usize, sites: &[usize]) -> Vec<u8> {
        let mut buffer = vec![0xCC; len];
        for &site in sites {
            buffer[site..site + ALIGNED_MOVE_SIGNATURE.len()]
                .copy_from_slice(ALIGNED_MOVE_SIGNATURE);
        }
        buffer
    }

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("alignment_fixer_tests");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn untouched_when_signature_is_absent() {
        let mut buffer: Vec<u8> = (0..=255).collect();
        let original = buffer.clone();

        assert!(patch_buffer(&mut buffer).is_empty());
        assert_eq!(buffer, original);
    }

    #[test]
    fn empty_buffer_is_a_noop() {
        assert!(patch_buffer(&mut []).is_empty());
    }

    #[test]
    fn single_site_changes_exactly_two_bytes() {
        // The worked example: signature at offset 100.
        let mut buffer = buffer_with_sites(300, &[100]);
        let original = buffer.clone();

        assert_eq!(patch_buffer(&mut buffer), vec![100]);

        assert_eq!(buffer[101], 0x10);
        assert_eq!(buffer[105], 0xF3);
        assert_eq!(buffer.len(), original.len());
        for (offset, (byte, before)) in buffer.iter().zip(&original).enumerate() {
            if offset != 101 && offset != 105 {
                assert_eq!(byte, before, "byte at offset {offset} changed");
            }
        }
    }

    #[test]
    fn single_site_is_not_patched_twice() {
        // The rewrite at +1 keeps the restarted scan from rematching the site.
        let mut buffer = buffer_with_sites(64, &[20]);

        assert_eq!(patch_buffer(&mut buffer), vec![20]);
    }

    #[test]
    fn two_sites_are_patched_in_order() {
        let mut buffer = buffer_with_sites(200, &[30, 120]);

        assert_eq!(patch_buffer(&mut buffer), vec![30, 120]);
        for site in [30, 120] {
            assert_eq!(buffer[site + 1], 0x10);
            assert_eq!(buffer[site + 5], 0xF3);
        }
    }

    #[test]
    fn second_scan_restarts_at_first_site() {
        // Back-to-back sites: the second begins inside the window a
        // past-the-match restart would have skipped.
        let len = ALIGNED_MOVE_SIGNATURE.len();
        let mut buffer = buffer_with_sites(3 * len, &[0, len]);

        assert_eq!(patch_buffer(&mut buffer), vec![0, len]);
    }

    #[test]
    fn third_site_is_left_alone() {
        let mut buffer = buffer_with_sites(300, &[10, 100, 200]);

        assert_eq!(patch_buffer(&mut buffer), vec![10, 100]);
        assert_eq!(buffer[201], ALIGNED_MOVE_SIGNATURE[1]);
        assert_eq!(buffer[205], ALIGNED_MOVE_SIGNATURE[5]);
    }

    #[test]
    fn patch_file_rewrites_in_place() {
        let path = temp_path("rewrites_in_place.dll");
        std::fs::write(&path, buffer_with_sites(256, &[40])).unwrap();

        assert_eq!(patch_file(&path).unwrap(), vec![40]);

        let patched = std::fs::read(&path).unwrap();
        assert_eq!(patched.len(), 256);
        assert_eq!(patched[41], 0x10);
        assert_eq!(patched[45], 0xF3);
    }

    #[test]
    fn patch_file_accepts_an_empty_file() {
        let path = temp_path("empty.dll");
        std::fs::write(&path, b"").unwrap();

        assert!(patch_file(&path).unwrap().is_empty());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn patch_file_reports_a_missing_target() {
        let path = temp_path("does_not_exist.dll");
        let _ = std::fs::remove_file(&path);

        match patch_file(&path) {
            Err(PatchError::MissingFile(reported)) => assert_eq!(reported, path),
            other => panic!("expected MissingFile, got {other:?}"),
        }
    }

    #[test]
    fn exit_codes_are_stable() {
        let missing = PatchError::MissingFile(PathBuf::from("x"));
        let io = PatchError::Io(io::Error::new(io::ErrorKind::Other, "boom"));

        assert_eq!(missing.exit_code(), 2);
        assert_eq!(io.exit_code(), 1);
    }
}
