//! `geodetic` command: convert between UTM and longitude/latitude.

use clap::Subcommand;
use pointlayer::coord::{geodetic_to_utm, utm_to_geodetic, UtmZone};

use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum GeodeticCommands {
    /// UTM easting/northing to longitude/latitude
    ToLonlat {
        /// Zone such as 18N or 56S
        #[arg(long)]
        zone: String,

        easting: f64,

        northing: f64,
    },

    /// Longitude/latitude to UTM in the point's natural zone
    ToUtm {
        #[arg(allow_negative_numbers = true)]
        longitude: f64,

        #[arg(allow_negative_numbers = true)]
        latitude: f64,
    },
}

pub fn run(command: GeodeticCommands) -> Result<(), CliError> {
    match command {
        GeodeticCommands::ToLonlat {
            zone,
            easting,
            northing,
        } => {
            let zone: UtmZone = zone.parse()?;
            let (longitude, latitude) = utm_to_geodetic(&zone, easting, northing)?;
            println!("{:.8} {:.8}", longitude, latitude);
        }
        GeodeticCommands::ToUtm {
            longitude,
            latitude,
        } => {
            let (zone, easting, northing) = geodetic_to_utm(longitude, latitude)?;
            println!("{} {:.3} {:.3}", zone, easting, northing);
        }
    }
    Ok(())
}
