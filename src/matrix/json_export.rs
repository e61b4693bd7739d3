use crate::error::GblasError;
use crate::matrix::{build, Form, Matrix};
use crate::types::ScalarValue;
use json::JsonValue;

impl Matrix {
    /// Human-readable dump of metadata and tuples for debugging
    pub fn to_json(&mut self) -> Result<JsonValue, GblasError> {
        self.finish()?;
        let (rows, cols, values) = build::extract_parts(self)?;
        let mut entries = JsonValue::new_array();
        for (p, (&r, &c)) in rows.iter().zip(cols.iter()).enumerate() {
            entries
                .push(object! {
                    "row": r,
                    "col": c,
                    "value": value_to_json(&values.get(p)),
                })
                .expect("entries is an array");
        }
        Ok(object! {
            "nrows": self.nrows,
            "ncols": self.ncols,
            "type": self.ty.name(),
            "form": form_name(self.form()),
            "iso": self.iso,
            "nvals": rows.len(),
            "entries": entries,
        })
    }
}

fn form_name(form: Form) -> &'static str {
    match form {
        Form::Hypersparse => "hypersparse",
        Form::Sparse => "sparse",
        Form::Bitmap => "bitmap",
        Form::Full => "full",
    }
}

fn value_to_json(v: &ScalarValue) -> JsonValue {
    match v {
        ScalarValue::Bool(x) => (*x).into(),
        ScalarValue::Int8(x) => (*x).into(),
        ScalarValue::Int16(x) => (*x).into(),
        ScalarValue::Int32(x) => (*x).into(),
        ScalarValue::Int64(x) => (*x).into(),
        ScalarValue::UInt8(x) => (*x).into(),
        ScalarValue::UInt16(x) => (*x).into(),
        ScalarValue::UInt32(x) => (*x).into(),
        ScalarValue::UInt64(x) => (*x).into(),
        ScalarValue::Fp32(x) => (*x).into(),
        ScalarValue::Fp64(x) => (*x).into(),
        ScalarValue::Fc32(z) => array![z.re, z.im],
        ScalarValue::Fc64(z) => array![z.re, z.im],
        ScalarValue::Udt(bytes) => JsonValue::Array(
            bytes.iter().map(|&b| JsonValue::from(b)).collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ScalarType, ScalarValue};

    #[test]
    fn json_dump_lists_entries() {
        let mut m = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        m.set_element(0, 2, ScalarValue::Int32(7)).unwrap();
        let dump = m.to_json().unwrap();
        assert_eq!(dump["nrows"], 3);
        assert_eq!(dump["nvals"], 1);
        assert_eq!(dump["entries"][0]["value"], 7);
    }
}
