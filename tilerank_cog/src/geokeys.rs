//! The fixed GeoTIFF key directory for EPSG:3857 Web Mercator. Every value
//! here is a constant: this pipeline only ever emits one CRS.

/// `GeoAsciiParamsTag` (34737) payload. `GTCitationGeoKey` references bytes
/// `[0..25)`, `GeogCitationGeoKey` references bytes `[25..32)`; both ranges
/// (and the trailing NUL) live in this one string.
pub const GEO_ASCII_PARAMS: &[u8] = b"WGS 84 / Pseudo-Mercator|WGS 84|\0";

const GT_CITATION_LEN: u16 = 25;
const GEOG_CITATION_OFFSET: u16 = 25;
const GEOG_CITATION_LEN: u16 = 7;

/// `GeoKeyDirectoryTag` (34735): a 4-short header (version, key revision,
/// minor revision, key count) followed by one 4-short record per key
/// `(KeyID, TIFFTagLocation, Count, Value_Offset)`. `TIFFTagLocation == 0`
/// means the value is the raw `Value_Offset`; otherwise it names the tag
/// (here always `GeoAsciiParamsTag`, 34737) holding the referenced data.
///
/// Deliberately 6 keys, not 7: `ProjLinearUnitsGeoKey` (3076 = 9001, meters)
/// is omitted. It's a unit-of-measure annotation with no effect on how
/// pixels map to coordinates, and keeping it would grow this directory past
/// the fixed 28-short block every consumer here assumes.
pub fn geo_key_directory() -> [u16; 28] {
	[
		1, 1, 0, 6, // header: version 1, revision 1.0, 6 keys
		1024, 0, 1, 2, // GTModelTypeGeoKey = 2 (projected)
		1025, 0, 1, 1, // GTRasterTypeGeoKey = 1 (PixelIsArea)
		1026, 34737, GT_CITATION_LEN, 0, // GTCitationGeoKey -> GeoAsciiParams[0..25]
		2049, 34737, GEOG_CITATION_LEN, GEOG_CITATION_OFFSET, // GeogCitationGeoKey -> GeoAsciiParams[25..32]
		2054, 0, 1, 9102, // GeogAngularUnitsGeoKey = 9102 (degree)
		3072, 0, 1, 3857, // ProjectedCSTypeGeoKey = 3857 (Pseudo-Mercator)
	]
}
