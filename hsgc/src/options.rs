/// Options controlling a heap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapOptions {
    /// Maximum live payload bytes. Allocations past this limit fail. No limit if `None`.
    pub heap_limit: Option<usize>,

    /// Log every completed collection at info level instead of debug
    pub log_collections: bool,
}

impl Default for HeapOptions {
    /// Create a new options struct with default values.
    fn default() -> Self {
        HeapOptionsBuilder::new().build()
    }
}

pub struct HeapOptionsBuilder(HeapOptions);

impl HeapOptionsBuilder {
    /// Create new options with default values.
    pub fn new() -> Self {
        Self(HeapOptions {
            heap_limit: None,
            log_collections: false,
        })
    }

    /// Return the options that have been built, consuming the builder.
    pub fn build(self) -> HeapOptions {
        self.0
    }

    pub fn heap_limit(mut self, heap_limit: Option<usize>) -> Self {
        self.0.heap_limit = heap_limit;
        self
    }

    pub fn log_collections(mut self, log_collections: bool) -> Self {
        self.0.log_collections = log_collections;
        self
    }
}
