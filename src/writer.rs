//! Streaming batch writer
//!
//! A [`TopicWriter`] accumulates timestamped records for one topic and sends
//! them in columnar batches whose estimated size stays under a flush
//! threshold derived from the transport's message ceiling:
//!
//! ```text
//! threshold = floor(max_message_bytes * flush_fraction)
//! ```
//!
//! Estimates exclude the per-batch schema overhead. Opening a writer checks
//! that the overhead fits in the margin between the threshold and the
//! ceiling, so a batch that respects the threshold never exceeds the ceiling.
//!
//! Records are sent in push order. A flush that fails leaves the pending
//! records untouched; nothing is retried internally.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::error::{OntologyError, Result};
use crate::ontology::Ontology;
use crate::registry::OntologyRegistry;
use crate::schema::{DataType, Field, SchemaEntry, StructuralSchema, TypeMarker, TIMESTAMP_FIELD};
use crate::transport::{Ack, TopicTarget, Transport};

/// Default transport message ceiling (4 MiB)
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;
/// Default share of the ceiling used as flush threshold
pub const DEFAULT_FLUSH_FRACTION: f64 = 0.9;

const OFFSET_WIDTH: usize = 4;
const LARGE_OFFSET_WIDTH: usize = 8;

/// One timestamped record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub timestamp_ns: i64,
    pub data: Json,
}

impl Message {
    pub fn new(timestamp_ns: i64, data: Json) -> Self {
        Self { timestamp_ns, data }
    }

    /// Serialize a native record
    pub fn from_record<T: Serialize>(timestamp_ns: i64, record: &T) -> Result<Self> {
        Ok(Self {
            timestamp_ns,
            data: serde_json::to_value(record)?,
        })
    }
}

/// Per-record size estimation
pub trait SizeEstimator {
    /// Estimated encoded size of one row, excluding schema overhead
    fn estimate(&self, schema: &StructuralSchema, message: &Message) -> usize;

    /// Bytes added once per batch on top of the row estimates
    fn schema_overhead(&self, schema: &StructuralSchema) -> usize {
        schema_overhead(schema)
    }
}

/// Estimates the columnar encoding of a row: fixed-width values count their
/// width, variable-length values count an offset plus their payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnarEstimator;

impl SizeEstimator for ColumnarEstimator {
    fn estimate(&self, schema: &StructuralSchema, message: &Message) -> usize {
        // timestamp column
        8 + estimate_fields(&schema.fields, &message.data)
    }
}

fn estimate_fields(fields: &[Field], value: &Json) -> usize {
    fields
        .iter()
        .map(|field| estimate_value(&field.data_type, value.get(&field.name).unwrap_or(&Json::Null)))
        .sum()
}

fn estimate_value(data_type: &DataType, value: &Json) -> usize {
    if let Some(width) = data_type.fixed_width() {
        return width;
    }
    match (data_type, value) {
        (DataType::String, Json::String(s)) | (DataType::Binary, Json::String(s)) => {
            OFFSET_WIDTH + s.len()
        }
        (DataType::LargeString, Json::String(s)) => LARGE_OFFSET_WIDTH + s.len(),
        (DataType::Binary, Json::Array(bytes)) => OFFSET_WIDTH + bytes.len(),
        (DataType::List(items), Json::Array(values)) => {
            OFFSET_WIDTH + values.iter().map(|v| estimate_value(items, v)).sum::<usize>()
        }
        (DataType::Struct(fields), v) => estimate_fields(fields, v),
        (DataType::Map(values), Json::Object(entries)) => {
            OFFSET_WIDTH
                + entries
                    .iter()
                    .map(|(key, v)| OFFSET_WIDTH + key.len() + estimate_value(values, v))
                    .sum::<usize>()
        }
        // type id plus the widest member
        (DataType::Variant, Json::String(s)) => 1 + OFFSET_WIDTH + s.len(),
        (DataType::Variant, _) => 1 + 8,
        _ => OFFSET_WIDTH,
    }
}

/// Size of the schema message that accompanies every batch
pub fn schema_overhead(schema: &StructuralSchema) -> usize {
    const MESSAGE_HEADER: usize = 128;
    MESSAGE_HEADER + field_overhead(TIMESTAMP_FIELD, &DataType::Timestamp) + fields_overhead(&schema.fields)
}

fn fields_overhead(fields: &[Field]) -> usize {
    fields
        .iter()
        .map(|f| field_overhead(&f.name, &f.data_type))
        .sum()
}

fn field_overhead(name: &str, data_type: &DataType) -> usize {
    const FIELD_HEADER: usize = 48;
    let children = match data_type {
        DataType::Struct(fields) => fields_overhead(fields),
        DataType::List(items) => field_overhead("item", items),
        DataType::Map(values) => field_overhead("key", &DataType::String) + field_overhead("value", values),
        _ => 0,
    };
    FIELD_HEADER + name.len() + children
}

/// One batch as handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnarBatch {
    tag: String,
    columns: Vec<String>,
    rows: Vec<Message>,
    estimated_bytes: usize,
    schema_overhead: usize,
}

impl ColumnarBatch {
    fn new(entry: &SchemaEntry, rows: Vec<Message>, estimated_bytes: usize, schema_overhead: usize) -> Self {
        let columns = std::iter::once(TIMESTAMP_FIELD.to_string())
            .chain(entry.schema.fields.iter().map(|f| f.name.clone()))
            .collect();
        Self {
            tag: entry.tag.clone(),
            columns,
            rows,
            estimated_bytes,
            schema_overhead,
        }
    }

    /// Ontology tag of the rows
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Column names: `timestamp_ns`, then one per top-level field
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Message] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.rows.iter().map(|m| m.timestamp_ns).collect()
    }

    /// Values of one top-level column, `Null` where a row omits it
    pub fn column(&self, name: &str) -> Option<Vec<Json>> {
        if name == TIMESTAMP_FIELD {
            return Some(self.rows.iter().map(|m| Json::from(m.timestamp_ns)).collect());
        }
        if !self.columns.iter().any(|c| c == name) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|m| m.data.get(name).cloned().unwrap_or(Json::Null))
                .collect(),
        )
    }

    /// Sum of the row estimates
    pub fn estimated_bytes(&self) -> usize {
        self.estimated_bytes
    }

    /// Size the transport will observe: rows plus schema overhead
    pub fn encoded_len(&self) -> usize {
        self.estimated_bytes + self.schema_overhead
    }

    fn into_rows(self) -> Vec<Message> {
        self.rows
    }
}

/// Flush sizing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Hard per-message ceiling of the transport
    pub max_message_bytes: usize,
    /// Share of the ceiling at which a batch is flushed, in `(0, 1]`
    pub flush_fraction: f64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            flush_fraction: DEFAULT_FLUSH_FRACTION,
        }
    }
}

impl WriterConfig {
    /// Never exceeds `max_message_bytes`, even where the `f64` product rounds up
    pub fn flush_threshold(&self) -> usize {
        let threshold = (self.max_message_bytes as f64 * self.flush_fraction).floor() as usize;
        threshold.min(self.max_message_bytes)
    }

    fn check(&self, overhead: usize) -> Result<usize> {
        let threshold = self.flush_threshold();
        let fraction_ok = self.flush_fraction > 0.0 && self.flush_fraction <= 1.0;
        let fits = threshold
            .checked_add(overhead)
            .map_or(false, |total| total <= self.max_message_bytes);
        if !fraction_ok || threshold == 0 || !fits {
            return Err(OntologyError::BatchLimit {
                threshold,
                overhead,
                ceiling: self.max_message_bytes,
            });
        }
        Ok(threshold)
    }
}

/// Counters for one writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WriterStats {
    pub batches_sent: usize,
    pub records_sent: usize,
    pub bytes_estimated: usize,
    pub pending: usize,
}

/// Write handle for one topic
///
/// Single producer: every mutating call takes `&mut self`. Dropping an open
/// writer attempts a final flush and logs if it fails; call
/// [`TopicWriter::close`] to observe the result instead.
pub struct TopicWriter<T: Transport> {
    transport: T,
    target: TopicTarget,
    entry: Arc<SchemaEntry>,
    estimator: Box<dyn SizeEstimator + Send>,
    config: WriterConfig,
    threshold: usize,
    overhead: usize,
    pending: Vec<Message>,
    pending_bytes: usize,
    closed: bool,
    stats: WriterStats,
}

impl<T: Transport> TopicWriter<T> {
    /// Open a writer for `tag`, proving the right to write it with `marker`
    pub fn open(
        registry: &OntologyRegistry,
        transport: T,
        target: TopicTarget,
        tag: &str,
        marker: &TypeMarker,
        config: WriterConfig,
    ) -> Result<Self> {
        let entry = registry.resolve_for_write(tag, marker)?;
        let estimator = ColumnarEstimator;
        let overhead = estimator.schema_overhead(&entry.schema);
        let threshold = config.check(overhead)?;

        debug!(
            topic = %target,
            tag,
            threshold,
            overhead,
            "opened topic writer"
        );

        Ok(Self {
            transport,
            target,
            entry,
            estimator: Box::new(estimator),
            config,
            threshold,
            overhead,
            pending: Vec::new(),
            pending_bytes: 0,
            closed: false,
            stats: WriterStats::default(),
        })
    }

    /// Open a writer for the native ontology `O`
    pub fn open_typed<O: Ontology>(
        registry: &OntologyRegistry,
        transport: T,
        target: TopicTarget,
        config: WriterConfig,
    ) -> Result<Self> {
        Self::open(registry, transport, target, O::TAG, &TypeMarker::of::<O>(), config)
    }

    /// Replace the size estimator. The batch limit is checked again.
    pub fn with_estimator(mut self, estimator: impl SizeEstimator + Send + 'static) -> Result<Self> {
        let overhead = estimator.schema_overhead(&self.entry.schema);
        self.threshold = self.config.check(overhead)?;
        self.overhead = overhead;
        self.estimator = Box::new(estimator);
        Ok(self)
    }

    pub fn target(&self) -> &TopicTarget {
        &self.target
    }

    pub fn tag(&self) -> &str {
        &self.entry.tag
    }

    pub fn flush_threshold(&self) -> usize {
        self.threshold
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            pending: self.pending.len(),
            ..self.stats
        }
    }

    /// Append a record, flushing the pending batch first if the record would
    /// push it over the threshold.
    ///
    /// A record larger than the threshold on its own is kept alone: the next
    /// push, flush or close sends it before anything else is appended. When
    /// this returns an error the record was not accepted.
    pub fn push(&mut self, message: Message) -> Result<()> {
        if self.closed {
            return Err(OntologyError::WriterClosed {
                topic: self.target.to_string(),
            });
        }
        self.entry.schema.validate_record(&self.entry.tag, &message.data)?;

        let estimate = self.estimator.estimate(&self.entry.schema, &message);
        if !self.pending.is_empty() && self.pending_bytes + estimate > self.threshold {
            self.flush()?;
        }
        self.pending.push(message);
        self.pending_bytes += estimate;
        Ok(())
    }

    /// Serialize and push a native record. `O` must be the registered type.
    pub fn push_record<O: Ontology>(&mut self, timestamp_ns: i64, record: &O) -> Result<()> {
        if TypeMarker::of::<O>() != self.entry.marker {
            return Err(OntologyError::NotSerializable {
                tag: self.entry.tag.clone(),
                type_name: std::any::type_name::<O>().to_string(),
            });
        }
        self.push(Message::from_record(timestamp_ns, record)?)
    }

    /// Send the pending records as one batch. Returns `None` if nothing was
    /// pending. On failure the pending records are kept as they were.
    pub fn flush(&mut self) -> Result<Option<Ack>> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let rows = std::mem::take(&mut self.pending);
        let batch = ColumnarBatch::new(&self.entry, rows, self.pending_bytes, self.overhead);

        match self.transport.send_batch(&self.target, &batch) {
            Ok(ack) => {
                debug!(
                    topic = %self.target,
                    rows = batch.len(),
                    bytes = batch.encoded_len(),
                    "flushed batch"
                );
                self.stats.batches_sent += 1;
                self.stats.records_sent += batch.len();
                self.stats.bytes_estimated += batch.estimated_bytes();
                self.pending_bytes = 0;
                Ok(Some(ack))
            }
            Err(err) => {
                self.pending = batch.into_rows();
                Err(err.into())
            }
        }
    }

    /// Flush what is pending and refuse further pushes. Safe to call twice.
    ///
    /// If the final flush fails the writer stays open so the caller can retry.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.closed = true;
        info!(
            topic = %self.target,
            batches = self.stats.batches_sent,
            records = self.stats.records_sent,
            "closed topic writer"
        );
        Ok(())
    }
}

impl<T: Transport> Drop for TopicWriter<T> {
    fn drop(&mut self) {
        if self.closed || self.pending.is_empty() {
            return;
        }
        if let Err(err) = self.flush() {
            warn!(
                topic = %self.target,
                pending = self.pending.len(),
                error = %err,
                "final flush failed, dropping pending records"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::CanonicalQueryDocument;
    use crate::schema::{OntologyDefinition, SerializationFormat};
    use crate::transport::{RawRow, TransportError};
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<ColumnarBatch>>,
        fail: Mutex<bool>,
    }

    impl Transport for Recorder {
        fn send_batch(
            &self,
            _target: &TopicTarget,
            batch: &ColumnarBatch,
        ) -> std::result::Result<Ack, TransportError> {
            if *self.fail.lock() {
                return Err(TransportError::Unavailable("down".into()));
            }
            self.batches.lock().push(batch.clone());
            Ok(Ack { rows: batch.len() })
        }

        fn submit_query(
            &self,
            _document: &CanonicalQueryDocument,
        ) -> std::result::Result<Vec<RawRow>, TransportError> {
            Ok(Vec::new())
        }
    }

    struct FixedEstimator(usize);

    impl SizeEstimator for FixedEstimator {
        fn estimate(&self, _schema: &StructuralSchema, _message: &Message) -> usize {
            self.0
        }
    }

    fn blob_registry() -> (OntologyRegistry, TypeMarker) {
        let registry = OntologyRegistry::new();
        registry
            .register_definition(OntologyDefinition {
                tag: "blob".into(),
                serialization_format: SerializationFormat::Ragged,
                fields: StructuralSchema::new(vec![
                    Field::new("seq", DataType::Uint64),
                    Field::new("payload", DataType::Binary),
                ]),
            })
            .unwrap();
        let marker = registry.resolve("blob").unwrap().marker.clone();
        (registry, marker)
    }

    fn blob(seq: u64) -> Message {
        Message::new(seq as i64, json!({"seq": seq, "payload": "x"}))
    }

    fn writer<'a>(registry: &OntologyRegistry, marker: &TypeMarker, transport: &'a Recorder) -> TopicWriter<&'a Recorder> {
        let target = TopicTarget::new("run_1", "/blob").unwrap();
        TopicWriter::open(registry, transport, target, "blob", marker, WriterConfig::default())
            .unwrap()
            .with_estimator(FixedEstimator(600))
            .unwrap()
    }

    #[test]
    fn test_threshold() {
        assert_eq!(WriterConfig::default().flush_threshold(), 3_774_873);
    }

    #[test]
    fn test_batches_respect_threshold() {
        let (registry, marker) = blob_registry();
        let transport = Recorder::default();
        let mut w = writer(&registry, &marker, &transport);

        for i in 0..200_000u64 {
            w.push(blob(i)).unwrap();
        }
        assert_eq!(transport.batches.lock().len(), 31);
        w.close().unwrap();

        let batches = transport.batches.lock();
        assert_eq!(batches.len(), 32);
        assert!(batches[..31].iter().all(|b| b.len() == 6291));
        assert_eq!(batches[31].len(), 4979);
        for batch in batches.iter() {
            assert!(batch.estimated_bytes() <= 3_774_873);
            assert!(batch.encoded_len() <= DEFAULT_MAX_MESSAGE_BYTES);
        }

        let stats = w.stats();
        assert_eq!(stats.batches_sent, 32);
        assert_eq!(stats.records_sent, 200_000);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn test_order_preserved() {
        let (registry, marker) = blob_registry();
        let transport = Recorder::default();
        let mut w = writer(&registry, &marker, &transport);
        for i in 0..20_000u64 {
            w.push(blob(i)).unwrap();
        }
        w.close().unwrap();

        let sent: Vec<i64> = transport
            .batches
            .lock()
            .iter()
            .flat_map(|b| b.timestamps())
            .collect();
        assert_eq!(sent, (0..20_000i64).collect::<Vec<_>>());
    }

    #[test]
    fn test_failed_flush_keeps_pending() {
        let (registry, marker) = blob_registry();
        let transport = Recorder::default();
        let mut w = writer(&registry, &marker, &transport);
        for i in 0..10u64 {
            w.push(blob(i)).unwrap();
        }

        *transport.fail.lock() = true;
        assert!(matches!(w.flush(), Err(OntologyError::Transport(_))));
        assert_eq!(w.pending_len(), 10);
        assert_eq!(w.pending_bytes(), 6000);
        assert!(matches!(w.close(), Err(OntologyError::Transport(_))));
        assert!(!w.is_closed());

        *transport.fail.lock() = false;
        w.close().unwrap();
        let batches = transport.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].timestamps(), (0..10i64).collect::<Vec<_>>());
    }

    #[test]
    fn test_oversized_record_sent_alone() {
        let (registry, marker) = blob_registry();
        let transport = Recorder::default();
        let target = TopicTarget::new("run_1", "/blob").unwrap();
        let config = WriterConfig {
            max_message_bytes: 10_000,
            flush_fraction: 0.9,
        };
        let mut w = TopicWriter::open(&registry, &transport, target, "blob", &marker, config).unwrap();

        w.push(blob(0)).unwrap();
        let big = Message::new(1, json!({"seq": 1, "payload": "x".repeat(20_000)}));
        w.push(big).unwrap();
        w.push(blob(2)).unwrap();
        w.close().unwrap();

        let sizes: Vec<usize> = transport.batches.lock().iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![1, 1, 1]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (registry, marker) = blob_registry();
        let transport = Recorder::default();
        let mut w = writer(&registry, &marker, &transport);
        w.push(blob(0)).unwrap();
        w.close().unwrap();
        w.close().unwrap();
        assert_eq!(transport.batches.lock().len(), 1);

        let err = w.push(blob(1)).unwrap_err();
        assert!(matches!(err, OntologyError::WriterClosed { topic } if topic == "run_1/blob"));
    }

    #[test]
    fn test_drop_flushes() {
        let (registry, marker) = blob_registry();
        let transport = Recorder::default();
        {
            let mut w = writer(&registry, &marker, &transport);
            w.push(blob(0)).unwrap();
            w.push(blob(1)).unwrap();
        }
        let batches = transport.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let (registry, marker) = blob_registry();
        let transport = Recorder::default();
        let mut w = writer(&registry, &marker, &transport);
        let err = w
            .push(Message::new(0, json!({"seq": -1, "payload": "x"})))
            .unwrap_err();
        assert!(matches!(err, OntologyError::SchemaMismatch { path, .. } if path == "seq"));
        assert_eq!(w.pending_len(), 0);
    }

    #[test]
    fn test_batch_limit() {
        let (registry, marker) = blob_registry();
        let transport = Recorder::default();
        let target = TopicTarget::new("run_1", "/blob").unwrap();
        let config = WriterConfig {
            max_message_bytes: 300,
            flush_fraction: 0.99,
        };
        let result = TopicWriter::open(&registry, &transport, target, "blob", &marker, config);
        assert!(matches!(result, Err(OntologyError::BatchLimit { .. })));
    }

    #[test]
    fn test_huge_ceiling_reports_batch_limit() {
        let (registry, marker) = blob_registry();
        let transport = Recorder::default();
        let target = TopicTarget::new("run_1", "/blob").unwrap();
        let config = WriterConfig {
            max_message_bytes: usize::MAX,
            flush_fraction: 1.0,
        };
        assert_eq!(config.flush_threshold(), usize::MAX);
        let result = TopicWriter::open(&registry, &transport, target, "blob", &marker, config);
        assert!(matches!(result, Err(OntologyError::BatchLimit { .. })));
    }

    #[test]
    fn test_schema_overhead_within_margin() {
        let (registry, _) = blob_registry();
        let entry = registry.resolve("blob").unwrap();
        let config = WriterConfig::default();
        let margin = config.max_message_bytes - config.flush_threshold();
        assert!(ColumnarEstimator.schema_overhead(&entry.schema) < margin);
    }

    #[test]
    fn test_columnar_layout() {
        let (registry, marker) = blob_registry();
        let transport = Recorder::default();
        let mut w = writer(&registry, &marker, &transport);
        w.push(blob(7)).unwrap();
        w.flush().unwrap();

        let batches = transport.batches.lock();
        let batch = &batches[0];
        assert_eq!(batch.tag(), "blob");
        assert_eq!(batch.columns(), ["timestamp_ns", "seq", "payload"]);
        assert_eq!(batch.column("seq"), Some(vec![json!(7)]));
        assert_eq!(batch.column("timestamp_ns"), Some(vec![json!(7)]));
        assert!(batch.column("missing").is_none());
    }

    #[test]
    fn test_columnar_estimate() {
        let schema = StructuralSchema::new(vec![
            Field::new("x", DataType::Float64),
            Field::new("name", DataType::String),
            Field::new("tags", DataType::map(DataType::Variant)),
        ]);
        let msg = Message::new(0, json!({"x": 1.0, "name": "abc", "tags": {"k": 1}}));
        // ts 8 + x 8 + name (4 + 3) + tags (4 + (4 + 1 + 9))
        assert_eq!(ColumnarEstimator.estimate(&schema, &msg), 8 + 8 + 7 + 18);
    }
}
