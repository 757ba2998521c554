pub mod assemble;
pub mod big_water;
pub mod draw_map;
pub mod fetch_layers;
pub mod interim;
pub mod legend;
pub mod parse_osm;
pub mod raster;
pub mod text;
pub mod vignette;

use std::path::Path;
use log::{info, error};

use crate::errors::{Error, Result};


/// One unit of work that pulls its input, turns it into an artefact and stores
/// it under `dir`. A stored artefact short-circuits the whole run.
pub trait Etl {
    type Input;
    type Output;

    fn etl_name(&self) -> &str;

    /// What this run is about, for the logs. Usually the place name.
    fn subject(&self) -> &str {
        ""
    }

    fn is_cached(&self, dir: &Path) -> Result<bool>;
    fn clean(&self, dir: &Path) -> Result<()>;

    fn extract(&mut self, dir: &Path) -> Result<Self::Input>;
    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;
    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()>;

    fn process(&mut self, dir: &Path) -> Result<()> {
        let name = self.etl_name().to_string();
        let subject = self.subject().to_string();
        info!(etl_name = name.as_str(), subject = subject.as_str(); "Starting ETL process");
        if self.is_cached(dir)? {
            info!(etl_name = name.as_str(), subject = subject.as_str(); "Using cached value");
            return Ok(());
        }

        info!(etl_name = name.as_str(), subject = subject.as_str(); "Extracting");
        let input = self.extract(dir).map_err(|err| stage_failed(&name, &subject, "extract", err))?;

        info!(etl_name = name.as_str(), subject = subject.as_str(); "Transforming");
        let output = self.transform(input).map_err(|err| stage_failed(&name, &subject, "transform", err))?;

        info!(etl_name = name.as_str(), subject = subject.as_str(); "Loading");
        self.load(dir, output).map_err(|err| stage_failed(&name, &subject, "load", err))?;

        info!(etl_name = name.as_str(), subject = subject.as_str(); "Process finished");
        Ok(())
    }
}

fn stage_failed(name: &str, subject: &str, stage: &'static str, err: Error) -> Error {
    let kind = format!("{:?}", err.kind);
    error!(
        etl_name = name,
        subject = subject,
        stage = stage,
        kind = kind.as_str(),
        err = err.message.as_str();
        "ETL stage failed"
    );
    err
}
