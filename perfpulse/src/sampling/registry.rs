use crate::sampling::{SamplingError, ValueKind};
use derive_more::Display;
use std::str::FromStr;

/// The identity field shared by all multi-instance counter classes.
const KEY_FIELD: &str = "Name";

const PROCESSOR_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Name", ValueKind::Text),
    FieldSpec::new("PercentProcessorTime", ValueKind::Int64),
    FieldSpec::new("PercentIdleTime", ValueKind::Int64),
    FieldSpec::new("PercentInterruptTime", ValueKind::Int64),
    FieldSpec::new("InterruptsPerSec", ValueKind::Int32),
];
const PROCESS_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Name", ValueKind::Text),
    FieldSpec::new("ProcessId", ValueKind::Int32),
    FieldSpec::new("ThreadCount", ValueKind::Int32),
    FieldSpec::new("HandleCount", ValueKind::Int32),
    FieldSpec::new("WorkingSet", ValueKind::Int64),
    FieldSpec::new("PercentProcessorTime", ValueKind::Int64),
];
const MEMORY_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("AvailableBytes", ValueKind::Int64),
    FieldSpec::new("CommittedBytes", ValueKind::Int64),
    FieldSpec::new("CacheBytes", ValueKind::Int64),
    FieldSpec::new("PageFaultsPerSec", ValueKind::Int32),
];
const NETWORK_INTERFACE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Name", ValueKind::Text),
    FieldSpec::new("Status", ValueKind::Int32),
    FieldSpec::new("BytesReceivedPerSec", ValueKind::Int64),
    FieldSpec::new("BytesSentPerSec", ValueKind::Int64),
    FieldSpec::new("CurrentBandwidth", ValueKind::Int64),
];
const PHYSICAL_DISK_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Name", ValueKind::Text),
    FieldSpec::new("DiskReadsPerSec", ValueKind::Int32),
    FieldSpec::new("DiskWritesPerSec", ValueKind::Int32),
    FieldSpec::new("DiskReadBytesPerSec", ValueKind::Int64),
    FieldSpec::new("DiskWriteBytesPerSec", ValueKind::Int64),
    FieldSpec::new("PercentDiskTime", ValueKind::Int64),
];
const SYSTEM_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Processes", ValueKind::Int32),
    FieldSpec::new("Threads", ValueKind::Int32),
    FieldSpec::new("ContextSwitchesPerSec", ValueKind::Int64),
    FieldSpec::new("SystemUpTime", ValueKind::Int64),
];

/// The counter classes known to the engine.
/// The catalog maps each class onto its backend provider name, its instance capability and
/// the set of fields which can be legally sampled.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
pub enum CounterClass {
    #[display("Processor")]
    Processor,
    #[display("Process")]
    Process,
    #[display("Memory")]
    Memory,
    #[display("NetworkInterface")]
    NetworkInterface,
    #[display("PhysicalDisk")]
    PhysicalDisk,
    #[display("System")]
    System,
}

impl CounterClass {
    /// Get the backend provider name of the counter class.
    pub fn provider(&self) -> &'static str {
        match self {
            CounterClass::Processor => "os.processor",
            CounterClass::Process => "os.process",
            CounterClass::Memory => "os.memory",
            CounterClass::NetworkInterface => "net.interface",
            CounterClass::PhysicalDisk => "disk.physical",
            CounterClass::System => "os.system",
        }
    }

    /// Check if the counter class exposes a single static instance.
    pub fn is_single_instance(&self) -> bool {
        match self {
            CounterClass::Memory | CounterClass::System => true,
            _ => false,
        }
    }

    /// Get the identity field of the counter class.
    /// It returns [None] for single-instance classes, these carry no instance identity.
    pub fn key_field(&self) -> Option<&'static str> {
        if self.is_single_instance() {
            None
        } else {
            Some(KEY_FIELD)
        }
    }

    /// Get the fields which can be sampled for this counter class.
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            CounterClass::Processor => PROCESSOR_FIELDS,
            CounterClass::Process => PROCESS_FIELDS,
            CounterClass::Memory => MEMORY_FIELDS,
            CounterClass::NetworkInterface => NETWORK_INTERFACE_FIELDS,
            CounterClass::PhysicalDisk => PHYSICAL_DISK_FIELDS,
            CounterClass::System => SYSTEM_FIELDS,
        }
    }

    /// Look up the given field within the counter class, field names compare
    /// case-insensitively.
    ///
    /// It returns the field description when the field is valid for this class.
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields()
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }
}

impl FromStr for CounterClass {
    type Err = SamplingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "processor" => Ok(CounterClass::Processor),
            "process" => Ok(CounterClass::Process),
            "memory" => Ok(CounterClass::Memory),
            "networkinterface" => Ok(CounterClass::NetworkInterface),
            "physicaldisk" => Ok(CounterClass::PhysicalDisk),
            "system" => Ok(CounterClass::System),
            _ => Err(SamplingError::UnknownClass(s.to_string())),
        }
    }
}

/// The description of a single counter class field.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
#[display("{name} ({kind})")]
pub struct FieldSpec {
    /// The canonical name of the field
    pub name: &'static str,
    /// The value kind of the field
    pub kind: ValueKind,
}

impl FieldSpec {
    const fn new(name: &'static str, kind: ValueKind) -> Self {
        Self { name, kind }
    }
}
