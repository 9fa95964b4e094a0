use crate::error::{AnalysisError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Column names of the named ParameterSet fields, in the canonical flattening order.
pub const NAMED_FIELDS: [&str; 8] = ["N", "L", "rho", "v", "eta", "r", "steps", "save_every"];

/// Column names reserved for the derived observable in the sweep dataset.
pub const OBSERVABLE_FIELDS: [&str; 2] = ["observable_mean", "observable_std"];

/// Physical configuration of one group of repeated runs, read from `params.csv`.
///
/// Two runs are repetitions of each other exactly when they share a ParameterSet.
/// Values are validated once at load time; consumers can rely on them afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Configured particle count.
    pub n: u32,
    /// Side of the square domain.
    pub l: f64,
    /// Number density. Derived as N / L^2 when the artifact has no `rho` column.
    pub rho: f64,
    /// Per-particle speed (v0).
    pub v: f64,
    /// Angular noise amplitude.
    pub eta: f64,
    /// Interaction radius.
    pub r: f64,
    /// Step budget of the simulation.
    pub steps: u64,
    /// Snapshots were saved every `save_every` steps.
    pub save_every: u64,
    /// Any further numeric columns, kept so the flattened field set mirrors the artifact.
    pub extra: BTreeMap<String, f64>,
}

impl ParameterSet {
    /// Loads the single-row parameter artifact at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AnalysisError::not_found("parameter artifact", path));
        }

        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        let headers = reader.headers()?.clone();
        let mut records = reader.records();
        let record = match records.next() {
            Some(record) => record?,
            None => {
                return Err(AnalysisError::malformed(path, "parameter artifact has no data row"))
            }
        };
        if records.next().is_some() {
            return Err(AnalysisError::malformed(
                path,
                "parameter artifact has more than one data row",
            ));
        }

        let mut fields = Vec::with_capacity(headers.len());
        for (name, raw) in headers.iter().zip(record.iter()) {
            let value: f64 = raw.parse().map_err(|_| {
                let reason = format!("field '{}' is not a number: '{}'", name, raw);
                AnalysisError::malformed(path, reason)
            })?;
            fields.push((name.to_string(), value));
        }

        let params = Self::from_fields(&fields, path)?;
        debug!("Loaded parameters from {}: {:?}", path.display(), params);
        Ok(params)
    }

    /// Builds and validates a ParameterSet from named values. `source` is only used in error
    /// messages.
    pub fn from_fields(fields: &[(String, f64)], source: &Path) -> Result<Self> {
        let mut map: BTreeMap<String, f64> = BTreeMap::new();
        for (name, value) in fields {
            if OBSERVABLE_FIELDS.contains(&name.as_str()) {
                let reason = format!("field name '{}' is reserved", name);
                return Err(AnalysisError::malformed(source, reason));
            }
            if !value.is_finite() {
                let reason = format!("field '{}' is not finite", name);
                return Err(AnalysisError::malformed(source, reason));
            }
            if map.insert(name.clone(), *value).is_some() {
                return Err(AnalysisError::malformed(source, format!("duplicate field '{}'", name)));
            }
        }

        let mut take = |name: &str| map.remove(name);
        let required = |name: &str, value: Option<f64>| {
            value.ok_or_else(|| {
                AnalysisError::malformed(source, format!("missing required field '{}'", name))
            })
        };

        let n = required("N", take("N"))?;
        let l = required("L", take("L"))?;
        let rho = take("rho");
        let v = required("v", take("v"))?;
        let eta = required("eta", take("eta"))?;
        let r = required("r", take("r"))?;
        let steps = required("steps", take("steps"))?;
        let save_every = take("save_every").unwrap_or(1.0);

        let n = as_count(source, "N", n, 1)?;
        let steps = as_count(source, "steps", steps, 0)?;
        let save_every = as_count(source, "save_every", save_every, 1)?;
        if l <= 0.0 {
            return Err(AnalysisError::malformed(source, format!("L must be positive, got {}", l)));
        }
        if v <= 0.0 {
            return Err(AnalysisError::malformed(source, format!("v must be positive, got {}", v)));
        }
        if eta < 0.0 {
            let reason = format!("eta must be non-negative, got {}", eta);
            return Err(AnalysisError::malformed(source, reason));
        }
        if r < 0.0 {
            let reason = format!("r must be non-negative, got {}", r);
            return Err(AnalysisError::malformed(source, reason));
        }

        Ok(ParameterSet {
            n: n as u32,
            l,
            rho: rho.unwrap_or(n as f64 / (l * l)),
            v,
            eta,
            r,
            steps,
            save_every,
            extra: map,
        })
    }

    /// Flattens the set into `(column, value)` pairs: named fields first, then extras in
    /// lexical order.
    pub fn fields(&self) -> Vec<(String, f64)> {
        let named = [
            self.n as f64,
            self.l,
            self.rho,
            self.v,
            self.eta,
            self.r,
            self.steps as f64,
            self.save_every as f64,
        ];
        NAMED_FIELDS
            .iter()
            .map(|name| name.to_string())
            .zip(named)
            .chain(self.extra.iter().map(|(k, v)| (k.clone(), *v)))
            .collect()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields().into_iter().map(|(name, _)| name).collect()
    }

    /// Step indices the simulator saves for this configuration: `0, save_every, ..., <= steps`.
    pub fn expected_step_indices(&self) -> impl Iterator<Item = u64> {
        (0..=self.steps).step_by(self.save_every as usize)
    }

    /// Writes the set as a single-row parameter artifact.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let fields = self.fields();
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        writer.write_record(fields.iter().map(|(name, _)| name.as_str()))?;
        writer.write_record(fields.iter().map(|(_, value)| value.to_string()))?;
        writer.flush()?;
        Ok(())
    }
}

fn as_count(source: &Path, name: &str, value: f64, min: u64) -> Result<u64> {
    if value.fract() != 0.0 || value < min as f64 || value > u32::MAX as f64 {
        return Err(AnalysisError::malformed(
            source,
            format!("field '{}' must be an integer >= {}, got {}", name, min, value),
        ));
    }
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_params(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn load_simulator_params() {
        let file = write_params(
            "N,L,rho,v,eta,r,steps,save_every\n500,10.000,5.000,0.030,0.100,1.000,1000,1\n",
        );
        let params = ParameterSet::load(file.path()).unwrap();

        assert_eq!(params.n, 500);
        assert_eq!(params.l, 10.0);
        assert_eq!(params.rho, 5.0);
        assert_eq!(params.v, 0.03);
        assert_eq!(params.steps, 1000);
        assert_eq!(params.save_every, 1);
        assert!(params.extra.is_empty());
        assert_eq!(params.field_names(), NAMED_FIELDS.to_vec());
    }

    #[test]
    fn defaults_save_every_and_derives_rho() {
        let file = write_params("N,L,v,eta,r,steps\n400,20,0.03,0.5,1,200\n");
        let params = ParameterSet::load(file.path()).unwrap();

        assert_eq!(params.save_every, 1);
        assert_eq!(params.rho, 1.0);
    }

    #[test]
    fn keeps_extra_fields_after_named_ones() {
        let file = write_params("M,N,L,v,eta,r,steps,save_every\n5,100,5,0.03,0.1,1,10,2\n");
        let params = ParameterSet::load(file.path()).unwrap();

        let names = params.field_names();
        assert_eq!(names.last().map(String::as_str), Some("M"));
        assert_eq!(names.len(), NAMED_FIELDS.len() + 1);
        assert_eq!(params.expected_step_indices().collect::<Vec<_>>(), vec![0, 2, 4, 6, 8, 10]);
    }

    #[test]
    fn rejects_missing_required_field() {
        let file = write_params("N,L,eta,r,steps\n100,5,0.1,1,10\n");
        let result = ParameterSet::load(file.path());
        assert!(matches!(result, Err(AnalysisError::MalformedData { .. })));
    }

    #[test]
    fn rejects_fractional_particle_count() {
        let file = write_params("N,L,v,eta,r,steps\n100.5,5,0.03,0.1,1,10\n");
        let result = ParameterSet::load(file.path());
        assert!(matches!(result, Err(AnalysisError::MalformedData { .. })));
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = ParameterSet::load(dir.path().join("params.csv"));
        assert!(matches!(result, Err(AnalysisError::NotFound { .. })));
    }

    #[test]
    fn write_then_load_is_identity() {
        let file = write_params("N,L,v,eta,r,steps,save_every,seed\n300,7.5,0.03,2.5,1,50,5,42\n");
        let params = ParameterSet::load(file.path()).unwrap();

        let out = NamedTempFile::new().unwrap();
        params.write_csv(out.path()).unwrap();
        assert_eq!(ParameterSet::load(out.path()).unwrap(), params);
    }
}
