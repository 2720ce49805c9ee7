pub mod cleaning;
pub mod columnar;
pub mod containment;
pub mod crs;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod output;
pub mod proximity;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use cleaning::CleaningRules;
use containment::PortPolygons;
use crs::Crs;
use error::PipelineError;
use log::info;
use proximity::PortIndex;
use std::ffi::OsString;
use std::path::PathBuf;

static DEFAULT_INPUT: &str = "data/raw_data/raw_data.parquet";
static DEFAULT_PORTS: &str = "data/ports/port_info.csv";
static DEFAULT_POLYGONS: &str = "data/ports/port_polygons.csv";
static DEFAULT_OUTPUT: &str = "vessels_with_parked_status.csv";

#[derive(Debug, Clone)]
pub struct Config {
    pub input_path: PathBuf,
    pub port_table_path: PathBuf,
    pub polygon_table_path: PathBuf,
    pub output_path: PathBuf,
    pub polygon_crs: Crs,
    pub batch_size: usize,
    /// Distance cutoffs in the units of the port index, ascending.
    pub thresholds: Vec<f64>,
    pub rules: CleaningRules,
    pub parallel: bool,
    pub diagnostics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input_path: PathBuf::from(DEFAULT_INPUT),
            port_table_path: PathBuf::from(DEFAULT_PORTS),
            polygon_table_path: PathBuf::from(DEFAULT_POLYGONS),
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            polygon_crs: Crs::Wgs84,
            batch_size: 10_000,
            thresholds: vec![1.0, 3.0, 5.0, 10.0],
            rules: CleaningRules::default(),
            parallel: false,
            diagnostics: true,
        }
    }
}

impl Config {
    /// Reject settings the pipeline cannot run with and sort the thresholds.
    pub fn validate(mut self) -> Result<Self, PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.thresholds.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one distance threshold is required".to_string(),
            ));
        }
        if let Some(t) = self.thresholds.iter().find(|t| !t.is_finite() || **t <= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "threshold {} is not a positive number",
                t
            )));
        }
        if self.rules.min_speed > self.rules.max_speed {
            return Err(PipelineError::InvalidConfig(format!(
                "speed range {}..{} is empty",
                self.rules.min_speed, self.rules.max_speed
            )));
        }
        self.thresholds.sort_by(|a, b| a.total_cmp(b));
        self.thresholds.dedup();
        Ok(self)
    }
}

fn command() -> Command {
    Command::new("ais_ports")
        .version("0.1")
        .about("annotate AIS positions with nearest port and in-port status [parquet|csv]")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_INPUT)
                .help("raw AIS position file, parquet or csv"),
        )
        .arg(
            Arg::new("ports")
                .long("ports")
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_PORTS)
                .help("port table with Main Port Name, Latitude, Longitude"),
        )
        .arg(
            Arg::new("polygons")
                .long("polygons")
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_POLYGONS)
                .help("port polygon table with port_name and WKT polygon"),
        )
        .arg(
            Arg::new("polygon-crs")
                .long("polygon-crs")
                .default_value("EPSG:4326")
                .help("coordinate reference system of the polygon table"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_OUTPUT)
                .help("enriched output file"),
        )
        .arg(
            Arg::new("batch-size")
                .short('b')
                .long("batch-size")
                .value_parser(value_parser!(usize))
                .default_value("10000")
                .help("records per containment batch"),
        )
        .arg(
            Arg::new("thresholds")
                .short('t')
                .long("thresholds")
                .value_parser(value_parser!(f64))
                .value_delimiter(',')
                .action(ArgAction::Append)
                .default_values(["1", "3", "5", "10"])
                .help("comma separated proximity thresholds"),
        )
        .arg(
            Arg::new("lat-column")
                .long("lat-column")
                .default_value("latitude"),
        )
        .arg(
            Arg::new("lon-column")
                .long("lon-column")
                .default_value("longitude"),
        )
        .arg(
            Arg::new("speed-column")
                .long("speed-column")
                .default_value("speed"),
        )
        .arg(
            Arg::new("max-speed")
                .long("max-speed")
                .value_parser(value_parser!(f64))
                .default_value("102.2")
                .help("highest valid speed, faster records are dropped"),
        )
        .arg(
            Arg::new("parallel")
                .long("parallel")
                .action(ArgAction::SetTrue)
                .help("run containment batches on all cores"),
        )
        .arg(
            Arg::new("no-diagnostics")
                .long("no-diagnostics")
                .action(ArgAction::SetTrue)
                .help("skip the per-column report"),
        )
}

pub fn get_arg() -> Result<Config> {
    parse_args(std::env::args_os())
}

pub fn parse_args<I, T>(args: I) -> Result<Config>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = command().try_get_matches_from(args)?;

    let path = |id: &str| {
        matches
            .get_one::<PathBuf>(id)
            .cloned()
            .unwrap_or_default()
    };
    let text = |id: &str| {
        matches
            .get_one::<String>(id)
            .cloned()
            .unwrap_or_default()
    };

    let config = Config {
        input_path: path("input"),
        port_table_path: path("ports"),
        polygon_table_path: path("polygons"),
        output_path: path("output"),
        polygon_crs: text("polygon-crs").parse()?,
        batch_size: matches.get_one::<usize>("batch-size").copied().unwrap_or(10_000),
        thresholds: matches
            .get_many::<f64>("thresholds")
            .unwrap_or_default()
            .copied()
            .collect(),
        rules: CleaningRules {
            lat_column: text("lat-column"),
            lon_column: text("lon-column"),
            speed_column: text("speed-column"),
            max_speed: matches.get_one::<f64>("max-speed").copied().unwrap_or(102.2),
            ..CleaningRules::default()
        },
        parallel: matches.get_flag("parallel"),
        diagnostics: !matches.get_flag("no-diagnostics"),
    };
    Ok(config.validate()?)
}

pub fn run(config: Config) -> Result<()> {
    let config = config.validate()?;
    info!("config is {:?}", config);

    let raw = cleaning::load_positions(&config.input_path, &config.rules)?;
    let table = cleaning::clean(raw, &config.rules);
    let ports = cleaning::load_ports(&config.port_table_path)?;
    let polygon_rows = cleaning::load_polygon_rows(&config.polygon_table_path)?;
    let polygons = PortPolygons::from_rows(polygon_rows, config.polygon_crs).with_context(|| {
        format!(
            "failed to load port polygons from {}",
            config.polygon_table_path.display()
        )
    })?;

    if config.diagnostics {
        let rows = table.records.iter().map(|r| r.fields.as_slice());
        diagnostics::investigate("AIS raw data", &table.headers, rows);
        let port_headers = ["Main Port Name", "Latitude", "Longitude"].map(String::from);
        diagnostics::investigate(
            "port information",
            &port_headers,
            ports.iter().map(|p| p.as_row()),
        );
    }

    let index = PortIndex::build(ports)?;
    let headers = table.headers.clone();
    let records = proximity::annotate_proximity(table, &index, &config.thresholds);

    let written = if config.parallel {
        let batches =
            containment::containment_batches_parallel(&records, &polygons, config.batch_size)?;
        output::write_enriched(
            &config.output_path,
            &headers,
            &config.thresholds,
            &records,
            batches,
        )?
    } else {
        let batches = containment::containment_batches(&records, &polygons, config.batch_size)?;
        output::write_enriched(
            &config.output_path,
            &headers,
            &config.thresholds,
            &records,
            batches,
        )?
    };

    info!("processing completed, {} records written.", written);
    Ok(())
}
