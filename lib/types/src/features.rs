//! WebAssembly proposal switches.

/// Controls which experimental features will be enabled.
/// Features usually have a corresponding [WebAssembly proposal].
///
/// [WebAssembly proposal]: https://github.com/WebAssembly/proposals
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Features {
    /// Threads proposal should be enabled
    pub threads: bool,
    /// Reference Types proposal should be enabled
    pub reference_types: bool,
    /// SIMD proposal should be enabled
    pub simd: bool,
    /// Bulk Memory proposal should be enabled
    pub bulk_memory: bool,
    /// Multi Value proposal should be enabled
    pub multi_value: bool,
    /// Tail call proposal should be enabled
    pub tail_call: bool,
    /// Multi Memory proposal should be enabled
    pub multi_memory: bool,
    /// 64-bit Memory proposal should be enabled
    pub memory64: bool,
    /// Wasm exceptions proposal (`try_table`) should be enabled
    pub exceptions: bool,
    /// The pre-standard exception handling proposal (`try`/`catch`) should
    /// be enabled
    pub legacy_exceptions: bool,
    /// Relaxed SIMD proposal should be enabled
    pub relaxed_simd: bool,
    /// Extended constant expressions proposal should be enabled
    pub extended_const: bool,
}

impl Features {
    /// Create a new feature set with the default features enabled.
    pub fn new() -> Self {
        Self {
            threads: true,
            // Reference types should be on by default
            reference_types: true,
            // SIMD should be on by default
            simd: true,
            // Bulk Memory should be on by default
            bulk_memory: true,
            // Multivalue should be on by default
            multi_value: true,
            tail_call: false,
            multi_memory: false,
            memory64: false,
            exceptions: false,
            legacy_exceptions: false,
            relaxed_simd: false,
            extended_const: false,
        }
    }

    /// Configures whether the WebAssembly threads proposal will be enabled.
    pub fn threads(&mut self, enable: bool) -> &mut Self {
        self.threads = enable;
        self
    }

    /// Configures whether the WebAssembly reference types proposal will be
    /// enabled.
    ///
    /// Enabling reference types also enables the bulk memory proposal it
    /// depends on.
    pub fn reference_types(&mut self, enable: bool) -> &mut Self {
        self.reference_types = enable;
        if enable {
            self.bulk_memory(true);
        }
        self
    }

    /// Configures whether the WebAssembly SIMD proposal will be enabled.
    pub fn simd(&mut self, enable: bool) -> &mut Self {
        self.simd = enable;
        self
    }

    /// Configures whether the WebAssembly bulk memory proposal will be
    /// enabled.
    pub fn bulk_memory(&mut self, enable: bool) -> &mut Self {
        self.bulk_memory = enable;
        if !enable {
            self.reference_types = false;
        }
        self
    }

    /// Configures whether the WebAssembly multi-value proposal will be
    /// enabled.
    pub fn multi_value(&mut self, enable: bool) -> &mut Self {
        self.multi_value = enable;
        self
    }

    /// Configures whether the WebAssembly tail call proposal will be
    /// enabled.
    pub fn tail_call(&mut self, enable: bool) -> &mut Self {
        self.tail_call = enable;
        self
    }

    /// Configures whether the WebAssembly multi-memory proposal will be
    /// enabled.
    pub fn multi_memory(&mut self, enable: bool) -> &mut Self {
        self.multi_memory = enable;
        self
    }

    /// Configures whether the WebAssembly 64-bit memory proposal will be
    /// enabled.
    pub fn memory64(&mut self, enable: bool) -> &mut Self {
        self.memory64 = enable;
        self
    }

    /// Configures whether the WebAssembly exception handling proposal
    /// (`try_table`) will be enabled.
    pub fn exceptions(&mut self, enable: bool) -> &mut Self {
        self.exceptions = enable;
        self
    }

    /// Configures whether the pre-standard exception handling proposal
    /// (`try`/`catch`) will be enabled.
    ///
    /// A module may validate under both exception models at once, but the
    /// compilation pipeline rejects modules that actually use both.
    pub fn legacy_exceptions(&mut self, enable: bool) -> &mut Self {
        self.legacy_exceptions = enable;
        self
    }

    /// Configures whether the WebAssembly relaxed SIMD proposal will be
    /// enabled.
    pub fn relaxed_simd(&mut self, enable: bool) -> &mut Self {
        self.relaxed_simd = enable;
        self
    }

    /// Configures whether the WebAssembly extended constant expressions
    /// proposal will be enabled.
    pub fn extended_const(&mut self, enable: bool) -> &mut Self {
        self.extended_const = enable;
        self
    }
}

impl Default for Features {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test_features {
    use super::*;

    #[test]
    fn default_features() {
        let default = Features::default();
        assert_eq!(default, Features::new());
        assert!(default.reference_types);
        assert!(!default.exceptions);
        assert!(!default.legacy_exceptions);
    }

    #[test]
    fn enabling_reference_types_enables_bulk_memory() {
        let mut features = Features::new();
        features.bulk_memory(false).reference_types(true);
        assert!(features.bulk_memory);
        features.bulk_memory(false);
        assert!(!features.reference_types);
    }
}
