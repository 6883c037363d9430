//! # Metadata Extraction
//!
//! Drives the whole pipeline: locate the metadata PID, reassemble its PES
//! units, decode each unit's tags and hand out one [`MetadataRecord`] per
//! unit.
//!
//! Two delivery modes are offered:
//!
//! - [`Extractor::read_all`] runs to completion and returns every record
//!   together with the error that ended the run, if any.
//! - [`Extractor::read_stream`] runs the pipeline on a background task and
//!   delivers records through a bounded channel as a [`futures::Stream`].
//!   The task waits while the channel is full and stops as soon as the
//!   stream is dropped or closed.
//!
//! Errors are never recovered from: the first one ends the extraction and
//! records delivered before it stay valid.
//!
//! ```rust
//! use futures::StreamExt;
//!
//! # async fn run(data: Vec<u8>) -> tsmeta::Result<()> {
//! let mut stream = tsmeta::read_stream(std::io::Cursor::new(data));
//! while let Some(record) = stream.next().await {
//!     println!("{}", record?);
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::ExtractorConfig;
use crate::error::{Result, TsMetaError};
use crate::format::ts::{
    PESAccumulator, PacketSource, PmtStreamLocator, Progress, StreamLocator, TSPacketReader,
};
use crate::meta::{decode_unit, Id3Decoder, MetadataRecord, TagDecoder};
use futures::Stream;
use log::debug;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

/// Pull-based extraction over one packet source.
///
/// Each call to [`next_record`](Self::next_record) reads just enough packets
/// to complete the next metadata unit. Once it has returned an error or
/// `Ok(None)` the reader is finished and keeps returning `Ok(None)`.
pub struct RecordReader<S, D = Id3Decoder> {
    source: S,
    locator: Arc<dyn StreamLocator>,
    decoder: Arc<D>,
    pid: Option<u16>,
    accumulator: Option<PESAccumulator>,
    finished: bool,
}

impl<S: PacketSource, D: TagDecoder> RecordReader<S, D> {
    /// Reader that locates its PID with `locator` and decodes with `decoder`.
    pub fn new(source: S, locator: Arc<dyn StreamLocator>, decoder: Arc<D>) -> Self {
        Self {
            source,
            locator,
            decoder,
            pid: None,
            accumulator: None,
            finished: false,
        }
    }

    /// PID of the metadata stream, once located.
    pub fn pid(&self) -> Option<u16> {
        self.pid
    }

    /// Whether end of input or an error has been returned.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns the next record, `Ok(None)` at end of input.
    pub async fn next_record(&mut self) -> Result<Option<MetadataRecord>> {
        if self.finished {
            return Ok(None);
        }

        let next = self.advance().await;
        if !matches!(next, Ok(Some(_))) {
            self.finished = true;
            self.accumulator = None;
        }
        next
    }

    async fn advance(&mut self) -> Result<Option<MetadataRecord>> {
        let pid = match self.pid {
            Some(pid) => pid,
            None => match self.locator.locate(&mut self.source).await? {
                Some(pid) => {
                    self.pid = Some(pid);
                    pid
                }
                None => {
                    debug!("input ended before the metadata stream was located");
                    return Ok(None);
                }
            },
        };

        while let Some(packet) = self.source.read_ts_packet().await? {
            if packet.pid() != pid {
                continue;
            }

            let accumulator = self.accumulator.take().unwrap_or_default();
            match accumulator.push_packet(&packet)? {
                Progress::Pending(accumulator) => self.accumulator = Some(accumulator),
                Progress::Complete(unit) => {
                    debug!(
                        "metadata unit complete: {} bytes, PTS {:?}",
                        unit.payload.len(),
                        unit.header.pts
                    );
                    return decode_unit(self.decoder.as_ref(), &unit).map(Some);
                }
            }
        }

        if let Some(partial) = self.accumulator.take() {
            debug!(
                "discarding incomplete metadata unit ({:?} bytes missing)",
                partial.remaining()
            );
        }
        Ok(None)
    }
}

/// Outcome of a run-to-completion extraction.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Records produced, in stream order
    pub records: Vec<MetadataRecord>,
    /// The error that ended the run; `None` when the input was exhausted
    pub error: Option<TsMetaError>,
}

impl Extraction {
    /// Whether the run reached the end of input without error.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Records on success, the terminating error otherwise.
    pub fn into_result(self) -> Result<Vec<MetadataRecord>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.records),
        }
    }
}

/// Records delivered by a background extraction task.
///
/// Yields `Ok` records in stream order, at most one `Err` (always last),
/// then `None`. Dropping the stream or calling [`close`](Self::close) stops
/// the task.
pub struct MetadataStream {
    rx: mpsc::Receiver<Result<MetadataRecord>>,
}

impl MetadataStream {
    /// Waits for the next record; `None` once the producer has stopped.
    pub async fn next_record(&mut self) -> Option<Result<MetadataRecord>> {
        self.rx.recv().await
    }

    /// Stops the producer. Records already buffered can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Stream for MetadataStream {
    type Item = Result<MetadataRecord>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Extracts timestamped metadata records from transport streams.
pub struct Extractor<D = Id3Decoder> {
    config: ExtractorConfig,
    locator: Arc<dyn StreamLocator>,
    decoder: Arc<D>,
}

impl Extractor<Id3Decoder> {
    /// Extractor locating `config.stream_type` through PAT/PMT and decoding
    /// ID3 tags.
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            locator: Arc::new(PmtStreamLocator::new(config.stream_type)),
            decoder: Arc::new(Id3Decoder::new()),
            config,
        }
    }
}

impl Default for Extractor<Id3Decoder> {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl<D: TagDecoder + 'static> Extractor<D> {
    /// Replaces the tag decoder.
    pub fn with_decoder<E: TagDecoder + 'static>(self, decoder: E) -> Extractor<E> {
        Extractor {
            config: self.config,
            locator: self.locator,
            decoder: Arc::new(decoder),
        }
    }

    /// Replaces the stream locator.
    pub fn with_locator<L: StreamLocator + 'static>(mut self, locator: L) -> Self {
        self.locator = Arc::new(locator);
        self
    }

    /// Settings this extractor was built with.
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Pull-based reader over `source` sharing this extractor's locator and
    /// decoder.
    pub fn record_reader<S: PacketSource>(&self, source: S) -> RecordReader<S, D> {
        RecordReader::new(source, Arc::clone(&self.locator), Arc::clone(&self.decoder))
    }

    /// Reads transport packets from `reader` until end of input or the first
    /// error.
    pub async fn read_all<R>(&self, reader: R) -> Extraction
    where
        R: AsyncRead + Unpin + Send,
    {
        self.read_all_packets(TSPacketReader::new(reader)).await
    }

    /// [`read_all`](Self::read_all) over an already framed packet source.
    pub async fn read_all_packets<S: PacketSource>(&self, source: S) -> Extraction {
        let mut records = self.record_reader(source);
        let mut extraction = Extraction::default();

        loop {
            match records.next_record().await {
                Ok(Some(record)) => extraction.records.push(record),
                Ok(None) => break,
                Err(e) => {
                    extraction.error = Some(e);
                    break;
                }
            }
        }

        debug!(
            "extraction finished with {} records",
            extraction.records.len()
        );
        extraction
    }

    /// Starts a background task extracting from `reader`.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn read_stream<R>(&self, reader: R) -> MetadataStream
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        self.stream_packets(TSPacketReader::new(reader))
    }

    /// [`read_stream`](Self::read_stream) over an already framed packet source.
    pub fn stream_packets<S: PacketSource + 'static>(&self, source: S) -> MetadataStream {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let mut records = self.record_reader(source);

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        debug!("metadata stream dropped, stopping extraction");
                        return;
                    }
                    next = records.next_record() => next,
                };

                match next {
                    Ok(Some(record)) => {
                        if tx.send(Ok(record)).await.is_err() {
                            debug!("metadata stream dropped, stopping extraction");
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        });

        MetadataStream { rx }
    }
}

/// Extracts every record from `reader` with the default configuration.
pub async fn read_all<R>(reader: R) -> Extraction
where
    R: AsyncRead + Unpin + Send,
{
    Extractor::default().read_all(reader).await
}

/// Streams records from `reader` with the default configuration.
///
/// # Panics
///
/// Must be called from within a Tokio runtime.
pub fn read_stream<R>(reader: R) -> MetadataStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    Extractor::default().read_stream(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::tests::{pes_packets, program_tables, ts_packet};
    use crate::format::ts::TsPacket;
    use crate::meta::id3::fixtures::{tag, txxx};
    use crate::meta::MetadataValue;
    use async_trait::async_trait;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::collections::{HashMap, VecDeque};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const PID: u16 = 0x102;

    /// Returns the same tags for every payload except `b"bad"`.
    struct FixedTags;

    impl TagDecoder for FixedTags {
        fn decode(&self, data: &[u8]) -> Result<HashMap<String, String>> {
            if data == b"bad" {
                return Err(TsMetaError::Decode("bad payload".into()));
            }
            Ok(HashMap::from([("TXXX".to_string(), "PFX\0payload".to_string())]))
        }
    }

    fn extractor() -> Extractor<FixedTags> {
        Extractor::default().with_decoder(FixedTags)
    }

    fn stream_with_units(units: &[(u64, &[u8])]) -> Vec<u8> {
        let mut data = program_tables(PID);
        for &(pts, payload) in units {
            data.extend(pes_packets(PID, pts, payload));
        }
        data
    }

    async fn packets(data: Vec<u8>) -> Vec<TsPacket> {
        let mut reader = TSPacketReader::new(Cursor::new(data));
        let mut packets = Vec::new();
        while let Some(packet) = reader.read_ts_packet().await.unwrap() {
            packets.push(packet);
        }
        packets
    }

    /// Program tables, then the same unit forever. Holds `alive` until dropped
    /// and counts every packet handed out in `reads`.
    struct EndlessSource {
        head: VecDeque<TsPacket>,
        unit: Vec<TsPacket>,
        next: usize,
        stall: bool,
        reads: Arc<AtomicUsize>,
        _alive: Arc<()>,
    }

    impl EndlessSource {
        async fn new(stall: bool, alive: Arc<()>) -> Self {
            Self {
                head: packets(program_tables(PID)).await.into(),
                unit: packets(pes_packets(PID, 0, b"unit")).await,
                next: 0,
                stall,
                reads: Arc::new(AtomicUsize::new(0)),
                _alive: alive,
            }
        }
    }

    #[async_trait]
    impl PacketSource for EndlessSource {
        async fn read_ts_packet(&mut self) -> Result<Option<TsPacket>> {
            if let Some(packet) = self.head.pop_front() {
                self.reads.fetch_add(1, Ordering::SeqCst);
                return Ok(Some(packet));
            }
            if self.stall {
                std::future::pending::<()>().await;
            }
            let packet = self.unit[self.next % self.unit.len()].clone();
            self.next += 1;
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(Some(packet))
        }
    }

    async fn wait_for_release(alive: &Arc<()>) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while Arc::strong_count(alive) > 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("producer task did not stop");
    }

    #[tokio::test]
    async fn test_single_unit_end_to_end() {
        let data = stream_with_units(&[(90_000, b"tag")]);
        let extraction = extractor().read_all(Cursor::new(data)).await;

        assert!(extraction.is_complete());
        assert_eq!(extraction.records.len(), 1);
        let record = &extraction.records[0];
        assert_eq!(record.pts_seconds(), 1.0);
        assert_eq!(
            record.get("TXXX"),
            Some(&MetadataValue {
                prefix: "PFX".into(),
                value: "payload".into()
            })
        );
    }

    #[tokio::test]
    async fn test_units_spanning_packets_in_order() {
        let long = vec![0x11u8; 500];
        let data = stream_with_units(&[(90_000, b"a"), (180_000, &long), (270_000, b"c")]);
        let records = extractor().read_all(Cursor::new(data)).await.into_result().unwrap();

        let pts: Vec<u64> = records.iter().map(|r| r.pts).collect();
        assert_eq!(pts, vec![90_000, 180_000, 270_000]);
    }

    #[tokio::test]
    async fn test_id3_payload() {
        let payload = tag(&[txxx("INTENSITY", "high")], 0);
        let data = stream_with_units(&[(45_000, &payload)]);
        let records = read_all(Cursor::new(data)).await.into_result().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].to_string(), "0.5: {TXXX: INTENSITY/high}");
    }

    #[tokio::test]
    async fn test_no_matching_packets() {
        let mut data = program_tables(PID);
        data.extend(ts_packet(0x100, true, 0, &[0x00; 10]));

        let extraction = extractor().read_all(Cursor::new(data)).await;
        assert!(extraction.is_complete());
        assert!(extraction.records.is_empty());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let extraction = extractor().read_all(Cursor::new(Vec::new())).await;
        assert!(extraction.is_complete());
        assert!(extraction.records.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_stream_keeps_completed_records() {
        let long = vec![0x22u8; 400];
        let mut data = stream_with_units(&[(90_000, b"first"), (180_000, &long)]);
        // cut into the last packet of the second unit
        data.truncate(data.len() - 100);

        let extraction = extractor().read_all(Cursor::new(data)).await;
        assert!(extraction.is_complete());
        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0].pts, 90_000);
    }

    #[tokio::test]
    async fn test_decode_failure_is_fatal() {
        let data = stream_with_units(&[(90_000, b"ok"), (180_000, b"bad"), (270_000, b"ok")]);
        let extraction = extractor().read_all(Cursor::new(data)).await;

        assert_eq!(extraction.records.len(), 1);
        assert!(matches!(extraction.error, Some(TsMetaError::Decode(_))));
    }

    #[tokio::test]
    async fn test_overrun_is_fatal() {
        let mut data = stream_with_units(&[(90_000, b"ok")]);
        let mut pes = crate::format::ts::tests::metadata_pes(180_000, b"0123456789");
        pes.truncate(pes.len() - 4);
        data.extend(ts_packet(PID, true, 1, &pes));
        data.extend(ts_packet(PID, false, 2, b"overflowing"));

        let extraction = extractor().read_all(Cursor::new(data)).await;
        assert_eq!(extraction.records.len(), 1);
        assert!(matches!(
            extraction.error,
            Some(TsMetaError::Overrun { expected: 10, actual: 17 })
        ));
    }

    #[tokio::test]
    async fn test_bad_sync_byte() {
        let mut data = stream_with_units(&[(90_000, b"ok")]);
        let mut broken = ts_packet(PID, true, 1, b"x");
        broken[0] = 0x00;
        data.extend(broken);

        let extraction = extractor().read_all(Cursor::new(data)).await;
        assert_eq!(extraction.records.len(), 1);
        assert!(matches!(extraction.error, Some(TsMetaError::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_missing_stream_type() {
        let data = stream_with_units(&[(90_000, b"ok")]);
        let config = ExtractorConfig::default().with_stream_type(0x86);
        let extraction = Extractor::new(config)
            .with_decoder(FixedTags)
            .read_all(Cursor::new(data))
            .await;

        assert!(extraction.records.is_empty());
        assert!(matches!(extraction.error, Some(TsMetaError::StreamNotFound(0x86))));
    }

    #[tokio::test]
    async fn test_record_reader_is_finished_after_error() {
        let data = stream_with_units(&[(0, b"bad"), (90_000, b"ok")]);
        let mut reader = extractor().record_reader(TSPacketReader::new(Cursor::new(data)));

        assert!(reader.next_record().await.is_err());
        assert!(reader.is_finished());
        assert_eq!(reader.pid(), Some(PID));
        assert!(reader.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_matches_read_all() {
        let data = stream_with_units(&[(90_000, b"a"), (180_000, b"b"), (270_000, b"c")]);
        let expected = extractor()
            .read_all(Cursor::new(data.clone()))
            .await
            .into_result()
            .unwrap();

        let extractor = Extractor::new(ExtractorConfig::default().with_channel_capacity(1))
            .with_decoder(FixedTags);
        let stream = extractor.read_stream(Cursor::new(data));
        let streamed: Vec<MetadataRecord> = stream.map(|r| r.unwrap()).collect().await;

        assert_eq!(streamed, expected);
    }

    #[tokio::test]
    async fn test_stream_error_is_last() {
        let data = stream_with_units(&[(90_000, b"ok"), (180_000, b"bad"), (270_000, b"ok")]);
        let mut stream = extractor().read_stream(Cursor::new(data));

        assert!(stream.next_record().await.unwrap().is_ok());
        assert!(matches!(
            stream.next_record().await,
            Some(Err(TsMetaError::Decode(_)))
        ));
        assert!(stream.next_record().await.is_none());
    }

    #[tokio::test]
    async fn test_producer_stops_when_stream_dropped() {
        let alive = Arc::new(());
        let source = EndlessSource::new(false, Arc::clone(&alive)).await;
        let mut stream = extractor().stream_packets(source);

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_ok());
        drop(stream);

        wait_for_release(&alive).await;
    }

    #[tokio::test]
    async fn test_producer_waits_for_slow_consumer() {
        let alive = Arc::new(());
        let source = EndlessSource::new(false, Arc::clone(&alive)).await;
        let reads = Arc::clone(&source.reads);
        let tables = source.head.len();
        let unit_packets = source.unit.len();

        let extractor = Extractor::new(ExtractorConfig::default().with_channel_capacity(1))
            .with_decoder(FixedTags);
        let mut stream = extractor.stream_packets(source);

        // one record buffered, one more completed and waiting to be sent
        let bound = tables + unit_packets * (1 + 2);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let parked = reads.load(Ordering::SeqCst);
        assert!(parked > tables, "producer never started");
        assert!(parked <= bound, "producer read {} packets while the consumer was idle", parked);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(reads.load(Ordering::SeqCst), parked);

        assert!(stream.next_record().await.unwrap().is_ok());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(reads.load(Ordering::SeqCst) <= bound + unit_packets);

        drop(stream);
        wait_for_release(&alive).await;
    }

    #[tokio::test]
    async fn test_close_interrupts_blocked_read() {
        let alive = Arc::new(());
        let source = EndlessSource::new(true, Arc::clone(&alive)).await;
        let mut stream = extractor().stream_packets(source);

        stream.close();
        wait_for_release(&alive).await;
        assert!(stream.next_record().await.is_none());
    }
}
