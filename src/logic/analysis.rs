// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Recognise filing codes in page text and classify the paper format.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

const PT_TO_MM: f64 = 25.4 / 72.0;

/// Reference paper formats in millimetres.
const FORMATS: [((f64, f64), &str); 9] = [
    ((210.0, 297.0), "A4"),
    ((145.0, 210.0), "A5"),
    ((102.5, 145.0), "A6"),
    ((53.0, 85.0), "TJT"),
    ((86.0, 54.0), "DNI"),
    ((85.0, 125.0), "PASAPORTE"),
    ((210.0, 297.0 / 3.0), "ACUSE"),
    ((297.0 / 3.0, 210.0), "CN07"),
    ((210.0 / 3.0, 297.0), "A4largo"),
];

pub const UNKNOWN_FORMAT: &str = "Desconocido";

static CODES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(@@@\d{15}@@@[^@]+@@@)",
        r"|\b(\d{15})\b",
        r"|\b(O\d{8}[es]\d{10})\b",
        r"|((?:NA|CD)\d{21})",
        r"|(EXT(?:-[a-f0-9]{4}){8})",
        r"|(90533\d{12}790\d{10}[A-Z0-9]\d{7}[A-Z0-9]\d)",
        r"|(EX\d\d)",
    ))
    .expect("valid code regex")
});

static FEE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^90533(\d{12})(790\d{10})([A-Z0-9]\d{7}[A-Z0-9])\d$").expect("valid fee regex")
});

static MASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@@@(\d{15})@@@([^@]+)@@@$").expect("valid mass-code regex"));

/// Parsed fee payment code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeeCode {
    pub raw: String,
    pub referencia: String,
    pub modelo: String,
    pub cif_pasivo: String,
}

/// Parsed bulk-notification code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MassCode {
    pub raw: String,
    pub expediente: String,
    pub nombre_doc: String,
}

/// Everything recognised on one page.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageAnalysis {
    pub expedientes: Vec<String>,
    pub masivos: Vec<MassCode>,
    pub tasas: Vec<FeeCode>,
    pub correos: Vec<String>,
    pub cves: Vec<String>,
    pub registros: Vec<String>,
    pub formularios: Vec<String>,
    pub es_acuse: bool,
    pub es_pasaporte: bool,
    pub formato_papel: String,
}

impl PageAnalysis {
    pub fn is_empty(&self) -> bool {
        self.expedientes.is_empty()
            && self.masivos.is_empty()
            && self.tasas.is_empty()
            && self.correos.is_empty()
            && self.cves.is_empty()
            && self.registros.is_empty()
            && self.formularios.is_empty()
    }

    /// Human-readable multi-line summary for the UI.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("Formato: {}", self.formato_papel)];
        if self.es_acuse {
            lines.push("Acuse de recibo".into());
        }
        if self.es_pasaporte {
            lines.push("Pasaporte".into());
        }
        let mut list = |label: &str, values: &[String]| {
            if !values.is_empty() {
                lines.push(format!("{label}: {}", values.join(", ")));
            }
        };
        list("Expedientes", &self.expedientes);
        list("Registros", &self.registros);
        list("Correos", &self.correos);
        list("CVE", &self.cves);
        list("Formularios", &self.formularios);
        for mass in &self.masivos {
            lines.push(format!("Masivo: {} ({})", mass.expediente, mass.nombre_doc));
        }
        for fee in &self.tasas {
            lines.push(format!("Tasa: {} modelo {} ({})", fee.referencia, fee.modelo, fee.cif_pasivo));
        }
        lines.join("\n")
    }
}

/// Closest reference format for a page of `width` × `height` points.
pub fn classify_format(width_pt: f64, height_pt: f64) -> &'static str {
    if width_pt <= 0.0 || height_pt <= 0.0 {
        return UNKNOWN_FORMAT;
    }
    let area = width_pt * PT_TO_MM * height_pt * PT_TO_MM;
    let aspect = width_pt.max(height_pt) / width_pt.min(height_pt);

    FORMATS
        .iter()
        .map(|&((w, h), name)| {
            let reference_aspect = w.max(h) / w.min(h);
            let distance = (area.sqrt() - (w * h).sqrt()).powi(2) + 10.0 * (aspect - reference_aspect).powi(2);
            (distance, name)
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, name)| name)
        .unwrap_or(UNKNOWN_FORMAT)
}

fn unique(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}

/// Scan page text for codes; dimensions in points enable format detection.
pub fn analyze_page(text: &str, width_pt: f64, height_pt: f64) -> PageAnalysis {
    let formato = classify_format(width_pt, height_pt);
    let mut result = PageAnalysis {
        es_acuse: matches!(formato, "ACUSE" | "CN07"),
        es_pasaporte: formato == "PASAPORTE",
        formato_papel: formato.to_string(),
        ..Default::default()
    };

    let mut expedientes = Vec::new();
    let mut registros = Vec::new();
    let mut correos = Vec::new();
    let mut cves = Vec::new();
    let mut formularios = Vec::new();

    for caps in CODES.captures_iter(text) {
        let group = |i: usize| caps.get(i).map(|m| m.as_str().trim().to_string());

        if let Some(raw) = group(1)
            && let Some(parts) = MASS.captures(&raw)
        {
            result.masivos.push(MassCode {
                expediente: parts[1].to_string(),
                nombre_doc: parts[2].to_string(),
                raw: raw.clone(),
            });
        }
        if let Some(value) = group(2) {
            expedientes.push(value);
        }
        if let Some(value) = group(3) {
            registros.push(value);
        }
        if let Some(value) = group(4) {
            correos.push(value);
        }
        if let Some(value) = group(5) {
            cves.push(value);
        }
        if let Some(raw) = group(6) {
            match FEE.captures(&raw) {
                Some(parts) => result.tasas.push(FeeCode {
                    referencia: format!("90533{}", &parts[1]),
                    modelo: parts[2].to_string(),
                    cif_pasivo: parts[3].to_string(),
                    raw: raw.clone(),
                }),
                None => log::warn!("Fee code found but not parsed: {raw}"),
            }
        }
        if let Some(value) = group(7) {
            formularios.push(value);
        }
    }

    result.expedientes = unique(expedientes);
    result.registros = unique(registros);
    result.correos = unique(correos);
    result.cves = unique(cves);
    result.formularios = unique(formularios);

    if !result.is_empty() {
        log::debug!(
            "Page analysis: {} expedientes, {} tasas, {} correos",
            result.expedientes.len(),
            result.tasas.len(),
            result.correos.len()
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const A4: (f64, f64) = (595.0, 842.0);

    #[test]
    fn classifies_common_formats() {
        assert_eq!(classify_format(A4.0, A4.1), "A4");
        assert_eq!(classify_format(A4.1, A4.0), "A4");
        assert_eq!(classify_format(420.0, 595.0), "A5");
        assert_eq!(classify_format(595.0, 281.0), "ACUSE");
        assert_eq!(classify_format(0.0, 842.0), UNKNOWN_FORMAT);
    }

    #[test]
    fn acuse_and_passport_flags_follow_format() {
        let acuse = analyze_page("", 595.0, 281.0);
        assert!(acuse.es_acuse);
        assert!(!acuse.es_pasaporte);

        let passport = analyze_page("", 85.0 / PT_TO_MM, 125.0 / PT_TO_MM);
        assert_eq!(passport.formato_papel, "PASAPORTE");
        assert!(passport.es_pasaporte);
    }

    #[test]
    fn finds_file_numbers_once() {
        let text = "Expediente 201612345678901 y de nuevo 201612345678901; otro 1234567890123456";
        let result = analyze_page(text, A4.0, A4.1);
        assert_eq!(result.expedientes, ["201612345678901"]);
    }

    #[test]
    fn parses_mass_codes() {
        let result = analyze_page("@@@201612345678901@@@Resolucion final@@@", A4.0, A4.1);
        assert_eq!(result.masivos.len(), 1);
        assert_eq!(result.masivos[0].expediente, "201612345678901");
        assert_eq!(result.masivos[0].nombre_doc, "Resolucion final");
        assert!(result.expedientes.is_empty());
    }

    #[test]
    fn parses_fee_codes() {
        let code = format!("90533{}790{}{}{}", "123456789012", "1234567890", "B1234567C", "4");
        let result = analyze_page(&format!("Pago: {code}"), A4.0, A4.1);
        assert_eq!(result.tasas.len(), 1);
        let fee = &result.tasas[0];
        assert_eq!(fee.referencia, "90533123456789012");
        assert_eq!(fee.modelo, "7901234567890");
        assert_eq!(fee.cif_pasivo, "B1234567C");
    }

    #[test]
    fn finds_registry_postal_cve_and_forms() {
        let text = concat!(
            "Registro O00012345e1234567890 ",
            "envio NA123456789012345678901 ",
            "CVE EXT-0a1b-2c3d-4e5f-6a7b-8c9d-0e1f-2a3b-4c5d ",
            "modelo EX15 y EX15"
        );
        let result = analyze_page(text, A4.0, A4.1);
        assert_eq!(result.registros, ["O00012345e1234567890"]);
        assert_eq!(result.correos, ["NA123456789012345678901"]);
        assert_eq!(result.cves, ["EXT-0a1b-2c3d-4e5f-6a7b-8c9d-0e1f-2a3b-4c5d"]);
        assert_eq!(result.formularios, ["EX15"]);
        assert!(result.summary().contains("Formularios: EX15"));
    }

    #[test]
    fn empty_text_yields_no_codes() {
        let result = analyze_page("nada que ver", A4.0, A4.1);
        assert!(result.is_empty());
        assert_eq!(result.summary(), "Formato: A4");
    }
}
