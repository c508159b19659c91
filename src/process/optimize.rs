use anyhow::{anyhow, Result};
use arrow::{
    array::{Array, ArrayRef, DictionaryArray, Float64Array, Int64Array, StringArray},
    compute::cast,
    datatypes::{DataType, Field, Int32Type, Schema},
    record_batch::RecordBatch,
};
use std::{collections::HashSet, sync::Arc};

/// Text columns with at most this many distinct values may become categorical.
pub const MAX_CATEGORIES: usize = 200;
/// ...and only if distinct values are at most this share of the rows.
pub const CATEGORY_RATIO: f64 = 0.5;

/// Dictionary type used for categorical text.
pub fn category_type() -> DataType {
    DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
}

/// Smallest signed integer type that holds `[min, max]`.
fn smallest_int(min: i64, max: i64) -> DataType {
    if min >= i8::MIN as i64 && max <= i8::MAX as i64 {
        DataType::Int8
    } else if min >= i16::MIN as i64 && max <= i16::MAX as i64 {
        DataType::Int16
    } else if min >= i32::MIN as i64 && max <= i32::MAX as i64 {
        DataType::Int32
    } else {
        DataType::Int64
    }
}

/// Optional sign followed by digits only.
fn is_integer_token(v: &str) -> bool {
    let digits = v.strip_prefix(['-', '+']).unwrap_or(v);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Infer the narrowest Arrow dtype for a column of cleaned text.
///
/// - every value an integer  → Int8/16/32/64
/// - every value numeric     → Float32 when lossless, else Float64
/// - low-cardinality text    → Dictionary(Int32, Utf8)
/// - anything else (or empty)→ Utf8
pub fn infer_text_dtype(sarr: &StringArray) -> DataType {
    let mut all_int = true;
    let mut all_num = true;
    let mut f32_exact = true;
    let (mut min, mut max) = (i64::MAX, i64::MIN);
    let mut non_null = 0usize;

    for v in sarr.iter().flatten() {
        non_null += 1;
        if all_int {
            match v.parse::<i64>() {
                Ok(i) => {
                    min = min.min(i);
                    max = max.max(i);
                }
                Err(_) => all_int = false,
            }
        }
        if all_num {
            match v.parse::<f64>() {
                // Integers past i64 would lose digits as floats; keep them as text.
                Ok(_) if is_integer_token(v) && v.parse::<i64>().is_err() => all_num = false,
                Ok(f) if f.is_finite() => f32_exact &= (f as f32) as f64 == f,
                _ => all_num = false,
            }
        }
        if !all_num {
            break;
        }
    }

    if non_null == 0 {
        return DataType::Utf8;
    }
    if all_int {
        return smallest_int(min, max);
    }
    if all_num {
        return if f32_exact {
            DataType::Float32
        } else {
            DataType::Float64
        };
    }

    let distinct: HashSet<&str> = sarr.iter().flatten().collect();
    let nunique = distinct.len();
    if nunique <= MAX_CATEGORIES && (nunique as f64) <= CATEGORY_RATIO * sarr.len() as f64 {
        category_type()
    } else {
        DataType::Utf8
    }
}

/// Analyze a text batch and derive its final schema. Columns named in `keep`
/// pass through with their current type.
pub fn analyze_batch_for_types(batch: &RecordBatch, keep: &[&str]) -> Result<Schema> {
    let current = batch.schema();
    let mut fields = Vec::with_capacity(batch.num_columns());
    for (arr, fld) in batch.columns().iter().zip(current.fields()) {
        if keep.contains(&fld.name().as_str()) {
            fields.push(fld.as_ref().clone());
            continue;
        }
        let ty = match arr.as_any().downcast_ref::<StringArray>() {
            Some(sarr) => infer_text_dtype(sarr),
            None => fld.data_type().clone(),
        };
        fields.push(Field::new(fld.name(), ty, true));
    }
    Ok(Schema::new(fields))
}

/// Convert one text column to `target`.
fn convert_text(sarr: &StringArray, target: &DataType) -> Result<ArrayRef> {
    let out: ArrayRef = match target {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            let wide: Int64Array = sarr
                .iter()
                .map(|v| v.and_then(|s| s.parse::<i64>().ok()))
                .collect();
            cast(&wide, target)?
        }
        DataType::Float32 | DataType::Float64 => {
            let wide: Float64Array = sarr
                .iter()
                .map(|v| v.and_then(|s| s.parse::<f64>().ok()))
                .collect();
            cast(&wide, target)?
        }
        DataType::Dictionary(_, _) => {
            let dict: DictionaryArray<Int32Type> = sarr.iter().collect();
            Arc::new(dict)
        }
        DataType::Utf8 => Arc::new(sarr.clone()),
        other => return Err(anyhow!("unsupported target type {:?}", other)),
    };
    Ok(out)
}

/// Convert text columns into the types named by `schema`.
pub fn convert_to_final_types(batch: &RecordBatch, schema: &Schema) -> Result<RecordBatch> {
    let mut out = Vec::with_capacity(batch.num_columns());

    for (arr, fld) in batch.columns().iter().zip(schema.fields()) {
        match arr.as_any().downcast_ref::<StringArray>() {
            Some(sarr) if fld.data_type() != &DataType::Utf8 => {
                out.push(convert_text(sarr, fld.data_type())?)
            }
            _ => out.push(arr.clone()),
        }
    }

    RecordBatch::try_new(Arc::new(schema.clone()), out).map_err(Into::into)
}

/// Analyze + convert in one step.
pub fn optimize_types(batch: &RecordBatch, keep: &[&str]) -> Result<RecordBatch> {
    let schema = analyze_batch_for_types(batch, keep)?;
    convert_to_final_types(batch, &schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float32Array, Int16Array, Int8Array};

    fn col(values: &[Option<&str>]) -> StringArray {
        values.iter().copied().collect()
    }

    #[test]
    fn integers_downcast_to_smallest_type() {
        assert_eq!(infer_text_dtype(&col(&[Some("1"), None, Some("-5")])), DataType::Int8);
        assert_eq!(infer_text_dtype(&col(&[Some("1"), Some("300")])), DataType::Int16);
        assert_eq!(infer_text_dtype(&col(&[Some("73557"), Some("83731")])), DataType::Int32);
        assert_eq!(
            infer_text_dtype(&col(&[Some("1"), Some("9000000000")])),
            DataType::Int64
        );
    }

    #[test]
    fn floats_prefer_lossless_f32() {
        assert_eq!(infer_text_dtype(&col(&[Some("1.5"), Some("2")])), DataType::Float32);
        assert_eq!(infer_text_dtype(&col(&[Some("0.1"), Some("2")])), DataType::Float64);
        assert_eq!(
            infer_text_dtype(&col(&[Some("5.397605e-79")])),
            DataType::Float64
        );
    }

    #[test]
    fn low_cardinality_text_becomes_categorical() {
        let repeated = col(&[Some("M"), Some("F"), Some("F"), Some("M"), Some("F")]);
        assert_eq!(infer_text_dtype(&repeated), category_type());

        let unique = col(&[Some("a"), Some("b"), Some("c")]);
        assert_eq!(infer_text_dtype(&unique), DataType::Utf8);

        let mixed = col(&[Some("1"), Some("x"), Some("x"), Some("x")]);
        assert_eq!(infer_text_dtype(&mixed), category_type());
    }

    #[test]
    fn oversized_integers_stay_text() {
        let ids = col(&[Some("12345678901234567890123"), Some("1"), Some("2")]);
        assert_eq!(infer_text_dtype(&ids), DataType::Utf8);
        assert_eq!(
            infer_text_dtype(&col(&[Some("-99999999999999999999"), Some("0.5")])),
            DataType::Utf8
        );
        assert!(is_integer_token("+42"));
        assert!(!is_integer_token("-"));
        assert!(!is_integer_token("1e5"));
    }

    #[test]
    fn non_finite_tokens_are_not_numeric() {
        let values = col(&[Some("1.5"), Some("inf"), Some("2.5")]);
        assert_eq!(infer_text_dtype(&values), DataType::Utf8);
        assert_eq!(
            infer_text_dtype(&col(&[Some("NAN"), Some("-Infinity"), Some("3")])),
            DataType::Utf8
        );
        assert_eq!(infer_text_dtype(&col(&[Some("1e5"), Some("2")])), DataType::Float32);
    }

    #[test]
    fn all_null_column_stays_text() {
        assert_eq!(infer_text_dtype(&col(&[None, None])), DataType::Utf8);
    }

    #[test]
    fn converts_batch_and_keeps_key() -> Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("SEQN", DataType::Int64, false),
            Field::new("RIAGENDR", DataType::Utf8, true),
            Field::new("BMXBMI", DataType::Utf8, true),
            Field::new("AGE", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef,
                Arc::new(col(&[Some("1"), Some("2"), None])),
                Arc::new(col(&[Some("22.5"), None, Some("30.25")])),
                Arc::new(col(&[Some("40"), Some("300"), Some("12")])),
            ],
        )?;

        let out = optimize_types(&batch, &["SEQN"])?;
        let schema = out.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Int8);
        assert_eq!(schema.field(2).data_type(), &DataType::Float32);
        assert_eq!(schema.field(3).data_type(), &DataType::Int16);

        let gender = out.column(1).as_any().downcast_ref::<Int8Array>().unwrap();
        assert!(gender.is_null(2));
        let bmi = out.column(2).as_any().downcast_ref::<Float32Array>().unwrap();
        assert_eq!(bmi.value(2), 30.25);
        let age = out.column(3).as_any().downcast_ref::<Int16Array>().unwrap();
        assert_eq!(age.value(1), 300);
        Ok(())
    }
}
