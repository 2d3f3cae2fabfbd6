// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Utility methods.

use std::boxed::Box;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::errors::{QcError, Result};

const GZ_BUF_SIZE: usize = 1 << 22;

/// Open a (possibly gzipped or lz4 compressed) file into a BufReader.
pub fn open_with_gz<P: AsRef<Path>>(p: P) -> Result<Box<dyn BufRead + Send>> {
    let path = p.as_ref();
    let r = File::open(path).map_err(|e| QcError::file(path, e))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => {
            let gz = MultiGzDecoder::new(r);
            Ok(Box::new(BufReader::with_capacity(GZ_BUF_SIZE, gz)))
        }
        Some("lz4") => {
            let lz = lz4::Decoder::new(r).map_err(|e| QcError::file(path, e))?;
            Ok(Box::new(BufReader::with_capacity(GZ_BUF_SIZE, lz)))
        }
        _ => Ok(Box::new(BufReader::with_capacity(32 * 1024, r))),
    }
}

/// Create `p` for buffered writing.
pub fn create_buffered<P: AsRef<Path>>(p: P) -> Result<BufWriter<File>> {
    let path = p.as_ref();
    let f = File::create(path).map_err(|e| QcError::file(path, e))?;
    Ok(BufWriter::new(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Read, Write};

    #[test]
    fn test_open_plain_and_gz() {
        let dir = tempfile::tempdir().unwrap();

        let plain = dir.path().join("reads.fastq");
        let mut w = create_buffered(&plain).unwrap();
        w.write_all(b"@r1\nACGT\n+\nIIII\n").unwrap();
        w.flush().unwrap();
        drop(w);

        let gz = dir.path().join("reads.fastq.gz");
        let mut enc = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        enc.write_all(b"@r1\nACGT\n+\nIIII\n").unwrap();
        enc.finish().unwrap();

        for p in &[plain, gz] {
            let mut s = String::new();
            open_with_gz(p).unwrap().read_to_string(&mut s).unwrap();
            assert_eq!(s, "@r1\nACGT\n+\nIIII\n");
        }
    }

    #[test]
    fn test_open_missing() {
        let r = open_with_gz("/nonexistent/reads.fastq.gz");
        assert!(matches!(r, Err(QcError::File { .. })));
    }
}
