//! Incremental module parsing and validation.

use super::environ::ModuleEnvironment;
use super::error::from_binary_reader_error;
use super::sections::{
    parse_code_section_entry, parse_element_section, parse_export_section,
    parse_function_section, parse_import_section, parse_start_section, parse_type_section,
};
use std::mem;
use tern_types::{Features, ModuleInfo, WasmError, WasmResult};
use wasmparser::{
    Chunk, FuncValidatorAllocations, Parser, Payload, ValidPayload, Validator, WasmFeatures,
};

/// Maps the embedder-facing [`Features`] onto wasmparser's validation
/// flags.
fn wasmparser_features(features: &Features) -> WasmFeatures {
    let mut flags = WasmFeatures::default();
    flags.set(WasmFeatures::THREADS, features.threads);
    flags.set(WasmFeatures::REFERENCE_TYPES, features.reference_types);
    flags.set(WasmFeatures::SIMD, features.simd);
    flags.set(WasmFeatures::BULK_MEMORY, features.bulk_memory);
    flags.set(WasmFeatures::MULTI_VALUE, features.multi_value);
    flags.set(WasmFeatures::TAIL_CALL, features.tail_call);
    flags.set(WasmFeatures::MULTI_MEMORY, features.multi_memory);
    flags.set(WasmFeatures::MEMORY64, features.memory64);
    flags.set(WasmFeatures::EXCEPTIONS, features.exceptions);
    flags.set(WasmFeatures::LEGACY_EXCEPTIONS, features.legacy_exceptions);
    flags.set(WasmFeatures::RELAXED_SIMD, features.relaxed_simd);
    flags.set(WasmFeatures::EXTENDED_CONST, features.extended_const);
    flags
}

/// An incremental parser producing a [`ModuleInfo`].
///
/// Bytes arrive in arbitrarily-sized chunks through
/// [`add_bytes`](StreamingParser::add_bytes); section payloads are
/// validated as soon as they are complete. The first error is sticky:
/// every later call is a no-op and [`finalize`](StreamingParser::finalize)
/// reports it.
pub struct StreamingParser {
    parser: Parser,
    validator: Validator,
    allocations: FuncValidatorAllocations,
    environ: ModuleEnvironment,
    buffer: Vec<u8>,
    consumed: usize,
    finished: bool,
    error: Option<WasmError>,
}

impl StreamingParser {
    /// Creates a parser validating against the given feature set.
    pub fn new(features: &Features) -> Self {
        Self {
            parser: Parser::new(0),
            validator: Validator::new_with_features(wasmparser_features(features)),
            allocations: FuncValidatorAllocations::default(),
            environ: ModuleEnvironment::new(),
            buffer: Vec::new(),
            consumed: 0,
            finished: false,
            error: None,
        }
    }

    /// Feeds the next chunk of the module binary.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        if self.finished || self.error.is_some() {
            return;
        }
        self.buffer.extend_from_slice(bytes);
        if let Err(error) = self.process(false) {
            self.error = Some(error);
        }
    }

    /// Signals end of input, yielding the finished module or the first
    /// error the parse hit.
    pub fn finalize(mut self) -> WasmResult<ModuleInfo> {
        if self.error.is_none() && !self.finished {
            if let Err(error) = self.process(true) {
                self.error = Some(error);
            }
        }
        match self.error {
            Some(error) => Err(error),
            None if self.finished && !self.buffer.is_empty() => {
                Err(WasmError::InvalidWebAssembly {
                    message: "trailing bytes after the module".to_string(),
                    offset: self.consumed,
                })
            }
            None if self.finished => Ok(self.environ.finish()),
            None => Err(WasmError::InvalidWebAssembly {
                message: "unexpected end of input".to_string(),
                offset: self.consumed,
            }),
        }
    }

    fn process(&mut self, eof: bool) -> WasmResult<()> {
        let mut offset = 0;
        while !self.finished {
            let chunk = self
                .parser
                .parse(&self.buffer[offset..], eof)
                .map_err(from_binary_reader_error)?;
            let (used, payload) = match chunk {
                Chunk::NeedMoreData(_) => break,
                Chunk::Parsed { consumed, payload } => (consumed, payload),
            };
            self.finished = Self::consume_payload(
                &mut self.validator,
                &mut self.allocations,
                &mut self.environ,
                payload,
            )?;
            offset += used;
        }
        self.buffer.drain(..offset);
        self.consumed += offset;
        Ok(())
    }

    /// Validates one payload and records what the compilation pipeline
    /// needs from it. Returns `true` once the module is complete.
    fn consume_payload(
        validator: &mut Validator,
        allocations: &mut FuncValidatorAllocations,
        environ: &mut ModuleEnvironment,
        payload: Payload<'_>,
    ) -> WasmResult<bool> {
        match validator
            .payload(&payload)
            .map_err(from_binary_reader_error)?
        {
            ValidPayload::Ok | ValidPayload::End(_) => {}
            ValidPayload::Parser(_) => {
                return Err(WasmError::Unsupported(
                    "nested modules and components".to_string(),
                ));
            }
            ValidPayload::Func(func, body) => {
                let mut func_validator = func.into_validator(mem::take(allocations));
                func_validator
                    .validate(&body)
                    .map_err(from_binary_reader_error)?;
                *allocations = func_validator.into_allocations();
            }
        }

        match payload {
            Payload::TypeSection(types) => parse_type_section(types, environ)?,
            Payload::ImportSection(imports) => parse_import_section(imports, environ)?,
            Payload::FunctionSection(functions) => parse_function_section(functions, environ)?,
            Payload::ExportSection(exports) => parse_export_section(exports, environ)?,
            Payload::StartSection { func, .. } => parse_start_section(func, environ)?,
            Payload::ElementSection(elements) => parse_element_section(elements, environ)?,
            Payload::CodeSectionStart { count, .. } => environ.reserve_entries(count)?,
            Payload::CodeSectionEntry(body) => parse_code_section_entry(&body, environ)?,
            Payload::End(_) => return Ok(true),
            // Tables, memories, globals, data and custom sections are
            // validated above but carry nothing the pipeline consults.
            _ => {}
        }
        Ok(false)
    }
}

/// Translates a complete module binary into a [`ModuleInfo`].
pub fn translate_module(data: &[u8], features: &Features) -> WasmResult<ModuleInfo> {
    let mut parser = StreamingParser::new(features);
    parser.add_bytes(data);
    parser.finalize()
}
