//! Built-in mappings for the site-survey workbook.
//!
//! Sheet names and cell positions match the `llenadoauto.xlsx` survey
//! template: general information for both link ends, tower space planning,
//! and four checkbox groups on the first information sheet.
//!
//! [`point_to_point`] covers the link design workbook, where several
//! fields are repeated in more than one cell of the same sheet.

use super::{MappingBuilder, TemplateMapping};
use crate::error::CellfillError;

pub const SHEET_COVER: &str = "0. Carátula";
pub const SHEET_INFO_A: &str = "1. Información General A";
pub const SHEET_INFO_B: &str = "2. Información General B";
pub const SHEET_TOWER_SPACE: &str = "3. Espacios en Torre y Piso A-B";
pub const SHEET_PLANS_A: &str = "4. Planos A";
pub const SHEET_PLANS_B: &str = "5. Planos B";
pub const SHEET_PHOTOS_A: &str = "6. Reporte Fotos A";
pub const SHEET_PHOTOS_B: &str = "7. Reporte Fotos B";

pub const SHEET_STUDY_A: &str = "4. Estudio de informacion A";
pub const SHEET_STUDY_B: &str = "5. Estudio de informacion B";
pub const SHEET_TOWERS_A: &str = "6. Estudio torres y antenas A";
pub const SHEET_TOWERS_B: &str = "7. Estudio torres y antenas B";
pub const SHEET_FEASIBILITY: &str = "8. Factibilidad";

/// Output file prefix used for survey documents.
pub const OUTPUT_PREFIX: &str = "DISENO_SOLUCION_";

/// Record keys are the survey's column headers, trailing spaces included.
const INFO_A_FIELDS: &[(&str, &str)] = &[
    ("NOMBRE DEL SITIO", "J9"),
    ("PROPIETARIO", "M10"),
    ("ID", "AF9"),
    ("ESTADO ", "AC15"),
    ("Calle", "D14"),
    ("Colonia", "D15"),
    ("Municipio", "E16"),
    ("C.P", "AC14"),
    ("Referencias", "J17"),
    ("Nombre de contacto en sitio", "H19"),
    ("Telefono", "AB19"),
    ("LATITUD (TORRE)", "K30"),
    ("LONGITUD (TORRE)", "AA30"),
    ("LATITUD (FACHADA)", "K27"),
    ("LONGITUD (FACHADA)", "AA27"),
    ("Altitud (msnm)", "M31"),
];

const INFO_B_FIELDS: &[(&str, &str)] = &[
    ("Nombre del sitio 2", "J9"),
    ("PROPIETARIO 2", "M10"),
    ("ID 2", "AF9"),
    ("ESTADO 2", "AC15"),
    ("Calle 2", "D14"),
    ("Colonia 2", "D15"),
    ("Municipio 2", "E16"),
    ("C.P 2", "AC14"),
    ("Referencias 2", "J17"),
    ("Nombre de contacto en sitio 2", "H19"),
    ("Telefono 2", "AB19"),
    ("LATITUD (TORRE) 2", "K30"),
    ("LONGITUD (TORRE) 2", "AA30"),
    ("LATITUD (FACHADA) 2", "K27"),
    ("LONGITUD (FACHADA) 2", "AA27"),
    ("Altitud (msnm) 2", "M31"),
];

const TOWER_SPACE_FIELDS: &[(&str, &str)] = &[
    ("Altura de la Torre", "L36"),
    ("Altura Edificio1", "AF36"),
    ("Nivel inferior de franja disponible", "U37"),
    ("Nivel superior de franja disponible", "AI37"),
    ("Altura de MW conforme a topologia", "C40"),
    ("Azimut RB ", "N40"),
    ("Propuesta de altura de antena de MW1", "AC40"),
    ("Propuesta de altura de antena de MW (SD)1", "AH40"),
];

const ZONE_OPTIONS: &[(&str, &str)] = &[
    ("urbana", "L21"),
    ("suburbana", "P21"),
    ("rural", "U21"),
    ("ejidal", "X21"),
    ("pueblo mágico", "AB21"),
];

const VISIBILITY_OPTIONS: &[(&str, &str)] = &[("si", "P22"), ("no", "S22")];

const ROAD_OPTIONS: &[(&str, &str)] = &[
    ("terracería", "G23"),
    ("pavimentado", "L23"),
    ("empedrado", "Q23"),
    ("mixto", "V23"),
];

const TOWER_OPTIONS: &[(&str, &str)] = &[
    ("autosoportada", "H34"),
    ("arriostrada", "P34"),
    ("monopolo", "W34"),
    ("minipolo", "AC34"),
    ("otro", "AH34"),
];

const LINK_HEADER: &[(&str, &str)] = &[
    ("ID", "B5"),
    ("Nombre del sitio A", "B6"),
    ("Nombre del sitio B", "B7"),
    ("Tipo de solucion", "B8"),
];

const LINK_REPEATED: &[(&str, &[&str])] = &[
    ("Configuración MW:", &["D9", "B14", "C28", "F28"]),
    ("Tamaño de la antena (m)", &["C27", "F27"]),
    ("Altura de la torre (m)", &["C29", "F29"]),
];

const LINK_BUDGET: &[(&str, &str)] = &[
    ("Distancia entre sitios (km)", "B30"),
    ("Frecuencia (GHz)", "B31"),
    ("Potencia de transmisión (dBm)", "B32"),
    ("Sensibilidad del receptor (dBm)", "B33"),
    ("Ganancia de la antena (dBi)", "B34"),
    ("Pérdidas en el cable (dB)", "B35"),
    ("Margen de desvanecimiento (dB)", "B36"),
    ("¿Existe algun breaker existente en sitio? ", "AB47"),
];

/// The point-to-point link design mapping.
///
/// Site B's study sheet swaps the two site names in rows 6 and 7.
pub fn point_to_point() -> Result<TemplateMapping, CellfillError> {
    let mut builder = MappingBuilder::new();

    for &(field, coord) in LINK_HEADER {
        builder = builder.field(SHEET_STUDY_A, field, [coord]);
        builder = builder.field(SHEET_FEASIBILITY, field, [coord]);
    }
    for &(field, coord) in LINK_HEADER {
        let coord = match coord {
            "B6" => "B7",
            "B7" => "B6",
            other => other,
        };
        builder = builder.field(SHEET_STUDY_B, field, [coord]);
    }
    for &(field, coords) in LINK_REPEATED {
        builder = builder.field(SHEET_STUDY_A, field, coords.iter().copied());
        builder = builder.field(SHEET_STUDY_B, field, coords.iter().copied());
    }
    for &(field, coord) in LINK_BUDGET {
        builder = builder.field(SHEET_STUDY_A, field, [coord]);
    }

    for (sheet, name) in [
        (SHEET_TOWERS_A, "Nombre del sitio A"),
        (SHEET_TOWERS_B, "Nombre del sitio B"),
    ] {
        builder = builder
            .field(sheet, "ID", ["B5"])
            .field(sheet, name, ["B6"])
            .field(sheet, "Altura de la torre (m)", ["B8"]);
    }

    builder.build()
}

/// The site-survey mapping.
///
/// Site B fields mostly carry a `" 2"` suffix in the record ("ID 2",
/// "Calle 2"); the site name is "Nombre del sitio 2".
pub fn site_survey() -> Result<TemplateMapping, CellfillError> {
    let mut builder = MappingBuilder::new();

    for &(field, coord) in INFO_A_FIELDS {
        builder = builder.field(SHEET_INFO_A, field, [coord]);
    }
    for &(field, coord) in INFO_B_FIELDS {
        builder = builder.field(SHEET_INFO_B, field, [coord]);
    }
    for &(field, coord) in TOWER_SPACE_FIELDS {
        builder = builder.field(SHEET_TOWER_SPACE, field, [coord]);
    }

    builder = builder
        .choice(SHEET_INFO_A, "tipo_zona", "Tipo de zona", ZONE_OPTIONS.iter().copied())
        .choice(SHEET_INFO_A, "visibilidad", "Visibilidad", VISIBILITY_OPTIONS.iter().copied())
        .choice(SHEET_INFO_A, "tipo_camino", "Tipo de camino", ROAD_OPTIONS.iter().copied())
        .choice(SHEET_INFO_A, "tipo_torre", "Tipo de torre", TOWER_OPTIONS.iter().copied());

    for sheet in [
        SHEET_COVER,
        SHEET_PLANS_A,
        SHEET_PLANS_B,
        SHEET_PHOTOS_A,
        SHEET_PHOTOS_B,
    ] {
        builder = builder.require_sheet(sheet);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_survey_is_valid() {
        let mapping = site_survey().unwrap();
        assert_eq!(mapping.sheets().count(), 3);
        assert_eq!(mapping.required_sheets().len(), 8);
        assert_eq!(mapping.fields_for(SHEET_INFO_B).len(), INFO_B_FIELDS.len());
        assert_eq!(mapping.fields_for(SHEET_INFO_B)[2].field, "ID 2");
    }

    #[test]
    fn test_site_survey_uses_survey_column_headers() {
        let mapping = site_survey().unwrap();
        let target = |sheet: &str, field: &str| {
            mapping
                .fields_for(sheet)
                .iter()
                .find(|f| f.field == field)
                .map(|f| f.targets[0].coord.to_string())
        };
        assert_eq!(target(SHEET_INFO_A, "ESTADO "), Some("AC15".into()));
        assert_eq!(target(SHEET_INFO_B, "Nombre del sitio 2"), Some("J9".into()));
        assert_eq!(target(SHEET_INFO_B, "NOMBRE DEL SITIO 2"), None);
        assert_eq!(target(SHEET_TOWER_SPACE, "Azimut RB "), Some("N40".into()));

        let link = point_to_point().unwrap();
        assert!(link
            .fields_for(SHEET_STUDY_A)
            .iter()
            .any(|f| f.field == "¿Existe algun breaker existente en sitio? "));
        assert_eq!(mapping.choice_groups_for(SHEET_INFO_A).len(), 4);
    }

    #[test]
    fn test_point_to_point_repeats_fields() {
        let mapping = point_to_point().unwrap();
        assert_eq!(mapping.sheets().count(), 5);

        let study_b = mapping.fields_for(SHEET_STUDY_B);
        let site_a = study_b.iter().find(|f| f.field == "Nombre del sitio A").unwrap();
        assert_eq!(site_a.targets[0].coord.to_string(), "B7");

        let config = study_b.iter().find(|f| f.field == "Configuración MW:").unwrap();
        let coords: Vec<String> = config.targets.iter().map(|t| t.coord.to_string()).collect();
        assert_eq!(coords, vec!["D9", "B14", "C28", "F28"]);
    }
}
