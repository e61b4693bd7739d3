/// How the mask selects positions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaskMode {
    /// Use only the presence of mask entries, not their values
    pub structural: bool,
    /// Invert the selection
    pub complement: bool,
}

/// Multiply-algorithm hint; `Default` lets the cost model decide
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MxmMethod {
    #[default]
    Default,
    Gustavson,
    Hash,
    /// Either saxpy flavor, chosen per task
    Saxpy,
    Dot,
}

/// Compression codec for serialization blobs
///
/// Only `None` has a built-in backend; the codec variants are carried so a
/// blob header can name them once a backend is wired in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Zstd(i32),
    Lz4,
    Lz4hc(i32),
}

/// Whether pack/import may trust caller arrays or must deep-check them
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImportTrust {
    /// Validate every invariant
    #[default]
    Secure,
    /// Trust the caller; O(1) metadata checks only
    Fast,
}

/// Per-call settings record; every field defaults to "do nothing"
#[derive(Clone, Debug, Default)]
pub struct Descriptor {
    /// Clear the output at mask-excluded positions after the accumulate step
    pub replace: bool,
    pub mask: MaskMode,
    /// Use the transpose of the first input
    pub transpose_a: bool,
    /// Use the transpose of the second input
    pub transpose_b: bool,
    pub mxm_method: MxmMethod,
    /// Eager sorting leaves no jumbled output
    pub sort_eager: bool,
    pub compression: Compression,
    pub import_trust: ImportTrust,
    /// Worker-count override for this call
    pub nthreads: Option<usize>,
    /// Smallest problem size worth parallelizing, override for this call
    pub chunk: Option<usize>,
}

impl Descriptor {
    pub fn new() -> Descriptor {
        Descriptor::default()
    }

    pub fn with_replace(mut self) -> Self {
        self.replace = true;
        self
    }

    pub fn with_complement_mask(mut self) -> Self {
        self.mask.complement = true;
        self
    }

    pub fn with_structural_mask(mut self) -> Self {
        self.mask.structural = true;
        self
    }

    pub fn with_transpose_a(mut self) -> Self {
        self.transpose_a = true;
        self
    }

    pub fn with_transpose_b(mut self) -> Self {
        self.transpose_b = true;
        self
    }

    pub fn with_mxm_method(mut self, method: MxmMethod) -> Self {
        self.mxm_method = method;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_does_nothing() {
        let d = Descriptor::new();
        assert!(!d.replace && !d.mask.complement && !d.mask.structural);
        assert!(!d.transpose_a && !d.transpose_b);
        assert_eq!(d.mxm_method, MxmMethod::Default);
        assert_eq!(d.compression, Compression::None);
        assert_eq!(d.import_trust, ImportTrust::Secure);
    }

    #[test]
    fn builder_composes() {
        let d = Descriptor::new()
            .with_replace()
            .with_complement_mask()
            .with_structural_mask()
            .with_transpose_a();
        assert!(d.replace && d.mask.complement && d.mask.structural && d.transpose_a);
    }
}
