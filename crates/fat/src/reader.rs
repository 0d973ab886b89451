//! Lazy cluster-chain reader
//!
//! Fetches one cluster at a time as the caller consumes bytes. The walk
//! is bounded by the volume's cluster count, so a cyclic chain on
//! corrupt media fails with `Corrupted` instead of reading forever; a
//! chain that ends before the directory entry's recorded size is also
//! corruption, never a silent short read.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use log::warn;
use umsfs_vfs::{FileReader, FsError, FsResult};

use crate::table::ChainLink;
use crate::volume::FatInner;

enum Pos {
    /// Next cluster to load
    Cluster(u32),
    /// No further clusters are needed
    Done,
}

pub(crate) struct FatReader {
    inner: Arc<FatInner>,
    pos: Pos,
    /// Bytes not yet delivered to the caller
    remaining: u64,
    /// Clusters loaded so far, for cycle detection
    walked: u32,
    buf: Vec<u8>,
    buf_pos: usize,
    buf_len: usize,
}

impl FatReader {
    pub(crate) fn new(inner: Arc<FatInner>, first_cluster: u32, size: u64) -> Self {
        let cluster_size = inner.cluster_size() as usize;
        FatReader {
            pos: if size == 0 { Pos::Done } else { Pos::Cluster(first_cluster) },
            remaining: size,
            walked: 0,
            buf: vec![0u8; cluster_size],
            buf_pos: 0,
            buf_len: 0,
            inner,
        }
    }

    fn fill(&mut self) -> FsResult<()> {
        let cluster = match self.pos {
            Pos::Cluster(c) => c,
            Pos::Done => return Err(FsError::Corrupted),
        };
        self.walked += 1;
        if self.walked > self.inner.cluster_count() {
            warn!("allocation chain longer than the volume, assuming a cycle");
            return Err(FsError::Corrupted);
        }
        self.inner.read_cluster(cluster, &mut self.buf)?;
        self.buf_pos = 0;
        self.buf_len = self.buf.len();

        self.pos = if self.remaining > self.buf_len as u64 {
            match self.inner.next_cluster(cluster)? {
                ChainLink::Next(next) => Pos::Cluster(next),
                ChainLink::End => {
                    warn!("allocation chain ended {} bytes early", self.remaining);
                    return Err(FsError::Corrupted);
                }
                ChainLink::Free | ChainLink::Bad => {
                    warn!("allocation chain hit an unallocated or bad cluster");
                    return Err(FsError::Corrupted);
                }
            }
        } else {
            Pos::Done
        };
        Ok(())
    }
}

impl FileReader for FatReader {
    fn read(&mut self, out: &mut [u8]) -> FsResult<usize> {
        if self.remaining == 0 || out.is_empty() {
            return Ok(0);
        }
        if self.buf_pos == self.buf_len {
            self.fill()?;
        }
        let n = out
            .len()
            .min(self.buf_len - self.buf_pos)
            .min(self.remaining as usize);
        out[..n].copy_from_slice(&self.buf[self.buf_pos..self.buf_pos + n]);
        self.buf_pos += n;
        self.remaining -= n as u64;
        Ok(n)
    }
}
