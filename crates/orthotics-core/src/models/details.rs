//! Prescription detail sub-records.
//!
//! Each record is a one-to-one extension of a prescription capturing one
//! clinical or manufacturing facet. Records are created lazily with default
//! values the first time they are accessed and are edited through coerced
//! form payloads (see [`crate::validation::coerce`]).

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use super::choices::choice_enum;
use super::prescription::Turnaround;
use crate::validation::{FieldErrors, FieldSchema, FieldSpec};

choice_enum! {
    /// Which facet of a prescription a detail record describes.
    DetailKind {
        ClinicalMeasures => "clinical_measures",
        IntrinsicAdjustments => "intrinsic_adjustments",
        OffLoading => "off_loading",
        PlantarModifiers => "plantar_modifiers",
        Postings => "postings",
        MaterialSelection => "material_selection",
        ShoeFitting => "shoe_fitting",
        DeviceOptions => "device_options",
        /// Status, lookups, turnaround and notes; stored on the prescription itself
        Administration => "administration",
    }
    default ClinicalMeasures
}

/// A detail record stored one-per-prescription under its [`DetailKind`].
pub trait DetailRecord: FieldSchema + Clone + Debug {
    const KIND: DetailKind;
}

/// A stored detail record with its bookkeeping.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DetailEntry<T> {
    pub prescription_id: String,
    #[serde(flatten)]
    pub record: T,
    pub created_at: String,
    pub updated_at: String,
}

choice_enum! {
    Expansion {
        None => "none",
        Minimal => "minimal",
        Standard => "standard",
        Maximum => "maximum",
    }
    default Standard
}

choice_enum! {
    ShellWidth {
        Standard => "standard",
        Wide => "wide",
        Slim => "slim",
        SuperSlim => "super_slim",
    }
    default Standard
}

choice_enum! {
    ShellLength {
        Standard => "standard",
        Long => "long",
        Short => "short",
    }
    default Standard
}

choice_enum! {
    /// Proximal flange arch height.
    PfaHeight {
        Straight => "straight",
        Curved => "curved",
        Scan => "scan",
        None => "none",
    }
    default Scan
}

choice_enum! {
    Skive {
        None => "none",
        Medial => "medial",
        Lateral => "lateral",
    }
    default None
}

choice_enum! {
    SkiveMethod {
        Depth => "depth",
        Degree => "degree",
    }
    default Depth
}

choice_enum! {
    SkiveInclination {
        Maximum => "maximum",
        Zero => "zero",
        Specific => "specific",
    }
    default Maximum
}

choice_enum! {
    HeelPostWidth {
        None => "none",
        HalfWidth => "half_width",
        FullWidth => "full_width",
    }
    default None
}

choice_enum! {
    ForefootPostWidth {
        None => "none",
        FullWidth => "full_width",
        HalfWidth => "half_width",
        QuarterlyWidth => "quarterly_width",
    }
    default None
}

choice_enum! {
    ShellMaterial {
        Pa11Nylon => "pa11_nylon",
    }
    default Pa11Nylon
}

choice_enum! {
    ShellThickness {
        Mm20 => "2.0mm",
        Mm25 => "2.5mm",
        Mm30 => "3.0mm",
        Mm40 => "4.0mm",
        Mm45 => "4.5mm",
    }
    default Mm30
}

choice_enum! {
    CoverMaterial {
        Eva120Black2mm => "eva_120_black_2mm",
        Eva120Black3mm => "eva_120_black_3mm",
        Eva120Red2mm => "eva_120_red_2mm",
        Eva120Red3mm => "eva_120_red_3mm",
        Eva120JellyBean => "eva_120_jelly_bean",
        MicrofibreBlack => "microfibre_black",
        MicrofibreBlue => "microfibre_blue",
        PptPoron16mm => "ppt_poron_1_6mm",
        PptPoron32mm => "ppt_poron_3_2mm",
        PoronGeneral => "poron_general",
        SlowReleasePoron => "slow_release_poron",
        None => "none",
    }
    default None
}

choice_enum! {
    PlantarCover {
        None => "none",
        Cambrille => "cambrille",
    }
    default None
}

choice_enum! {
    CoverLength {
        Full => "full",
        Sulcus => "sulcus",
        Met => "met",
    }
    default Full
}

choice_enum! {
    SizingStyle {
        Mens => "mens",
        Womens => "womens",
        WomensAddress => "womens_address",
    }
    default Mens
}

/// Foot alignment measurements, in degrees and millimetres.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClinicalMeasure {
    pub left_scan_angle: Option<f64>,
    pub left_forefoot_varus: Option<f64>,
    pub left_forefoot_valgus: Option<f64>,
    pub left_heel_to_mpj_centre: Option<f64>,
    pub left_posterior_heel_to_heel_centre: Option<f64>,
    pub right_scan_angle: Option<f64>,
    pub right_forefoot_varus: Option<f64>,
    pub right_forefoot_valgus: Option<f64>,
    pub right_heel_to_mpj_centre: Option<f64>,
    pub right_posterior_heel_to_heel_centre: Option<f64>,
}

impl FieldSchema for ClinicalMeasure {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::optional_number("left_scan_angle"),
            FieldSpec::optional_number("left_forefoot_varus"),
            FieldSpec::optional_number("left_forefoot_valgus"),
            FieldSpec::optional_number("left_heel_to_mpj_centre"),
            FieldSpec::optional_number("left_posterior_heel_to_heel_centre"),
            FieldSpec::optional_number("right_scan_angle"),
            FieldSpec::optional_number("right_forefoot_varus"),
            FieldSpec::optional_number("right_forefoot_valgus"),
            FieldSpec::optional_number("right_heel_to_mpj_centre"),
            FieldSpec::optional_number("right_posterior_heel_to_heel_centre"),
        ];
        FIELDS
    }
}

impl DetailRecord for ClinicalMeasure {
    const KIND: DetailKind = DetailKind::ClinicalMeasures;
}

/// Shell shape adjustments built into the device.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntrinsicAdjustment {
    pub left_arch_expansion: Expansion,
    pub left_heel_expansion: Expansion,
    pub left_shell_width: ShellWidth,
    pub left_shell_length: ShellLength,
    pub left_pfa_height: PfaHeight,
    pub left_pfa_value_mm: Option<f64>,
    pub left_skive: Skive,
    pub left_skive_method: Option<SkiveMethod>,
    pub left_skive_depth_mm: Option<f64>,
    pub left_skive_degree: Option<f64>,
    pub left_skive_inclination: Option<SkiveInclination>,
    pub left_skive_specific_inclination: Option<f64>,
    pub right_arch_expansion: Expansion,
    pub right_heel_expansion: Expansion,
    pub right_shell_width: ShellWidth,
    pub right_shell_length: ShellLength,
    pub right_pfa_height: PfaHeight,
    pub right_pfa_value_mm: Option<f64>,
    pub right_skive: Skive,
    pub right_skive_method: Option<SkiveMethod>,
    pub right_skive_depth_mm: Option<f64>,
    pub right_skive_degree: Option<f64>,
    pub right_skive_inclination: Option<SkiveInclination>,
    pub right_skive_specific_inclination: Option<f64>,
}

impl FieldSchema for IntrinsicAdjustment {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::choice("left_arch_expansion", Expansion::CHOICES, Expansion::default_str()),
            FieldSpec::choice("left_heel_expansion", Expansion::CHOICES, Expansion::default_str()),
            FieldSpec::choice("left_shell_width", ShellWidth::CHOICES, ShellWidth::default_str()),
            FieldSpec::choice("left_shell_length", ShellLength::CHOICES, ShellLength::default_str()),
            FieldSpec::choice("left_pfa_height", PfaHeight::CHOICES, PfaHeight::default_str()),
            FieldSpec::optional_number("left_pfa_value_mm"),
            FieldSpec::choice("left_skive", Skive::CHOICES, Skive::default_str()),
            FieldSpec::optional_choice("left_skive_method", SkiveMethod::CHOICES),
            FieldSpec::optional_number("left_skive_depth_mm"),
            FieldSpec::optional_number("left_skive_degree"),
            FieldSpec::optional_choice("left_skive_inclination", SkiveInclination::CHOICES),
            FieldSpec::optional_number("left_skive_specific_inclination"),
            FieldSpec::choice("right_arch_expansion", Expansion::CHOICES, Expansion::default_str()),
            FieldSpec::choice("right_heel_expansion", Expansion::CHOICES, Expansion::default_str()),
            FieldSpec::choice("right_shell_width", ShellWidth::CHOICES, ShellWidth::default_str()),
            FieldSpec::choice("right_shell_length", ShellLength::CHOICES, ShellLength::default_str()),
            FieldSpec::choice("right_pfa_height", PfaHeight::CHOICES, PfaHeight::default_str()),
            FieldSpec::optional_number("right_pfa_value_mm"),
            FieldSpec::choice("right_skive", Skive::CHOICES, Skive::default_str()),
            FieldSpec::optional_choice("right_skive_method", SkiveMethod::CHOICES),
            FieldSpec::optional_number("right_skive_depth_mm"),
            FieldSpec::optional_number("right_skive_degree"),
            FieldSpec::optional_choice("right_skive_inclination", SkiveInclination::CHOICES),
            FieldSpec::optional_number("right_skive_specific_inclination"),
        ];
        FIELDS
    }
}

impl DetailRecord for IntrinsicAdjustment {
    const KIND: DetailKind = DetailKind::IntrinsicAdjustments;
}

/// Pressure off-loading features.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OffLoading {
    pub metatarsal_dome: bool,
    pub metatarsal_bar: bool,
    pub morton_extension: bool,
    pub kinetic_wedge: bool,
    pub lateral_wedge: bool,
    pub medial_wedge: bool,
    pub heel_skive: bool,
    pub heel_aperture: bool,
    pub custom_notes: Option<String>,
}

impl FieldSchema for OffLoading {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::boolean("metatarsal_dome"),
            FieldSpec::boolean("metatarsal_bar"),
            FieldSpec::boolean("morton_extension"),
            FieldSpec::boolean("kinetic_wedge"),
            FieldSpec::boolean("lateral_wedge"),
            FieldSpec::boolean("medial_wedge"),
            FieldSpec::boolean("heel_skive"),
            FieldSpec::boolean("heel_aperture"),
            FieldSpec::optional_text("custom_notes"),
        ];
        FIELDS
    }
}

impl DetailRecord for OffLoading {
    const KIND: DetailKind = DetailKind::OffLoading;
}

/// Upper bound for plantar modifier measurements, in mm.
pub const MAX_PLANTAR_MODIFIER_MM: f64 = 100.0;

/// Plantar surface modifications, in mm.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlantarModifier {
    pub left_y_rib: f64,
    pub left_k_rib: f64,
    pub left_cuboid: f64,
    pub left_styloid: f64,
    pub left_navicular: f64,
    pub left_first_ray: f64,
    pub left_fifth_ray: f64,
    pub right_y_rib: f64,
    pub right_k_rib: f64,
    pub right_cuboid: f64,
    pub right_styloid: f64,
    pub right_navicular: f64,
    pub right_first_ray: f64,
    pub right_fifth_ray: f64,
}

impl PlantarModifier {
    fn measurements(&self) -> [(&'static str, f64); 14] {
        [
            ("left_y_rib", self.left_y_rib),
            ("left_k_rib", self.left_k_rib),
            ("left_cuboid", self.left_cuboid),
            ("left_styloid", self.left_styloid),
            ("left_navicular", self.left_navicular),
            ("left_first_ray", self.left_first_ray),
            ("left_fifth_ray", self.left_fifth_ray),
            ("right_y_rib", self.right_y_rib),
            ("right_k_rib", self.right_k_rib),
            ("right_cuboid", self.right_cuboid),
            ("right_styloid", self.right_styloid),
            ("right_navicular", self.right_navicular),
            ("right_first_ray", self.right_first_ray),
            ("right_fifth_ray", self.right_fifth_ray),
        ]
    }
}

impl FieldSchema for PlantarModifier {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::number("left_y_rib"),
            FieldSpec::number("left_k_rib"),
            FieldSpec::number("left_cuboid"),
            FieldSpec::number("left_styloid"),
            FieldSpec::number("left_navicular"),
            FieldSpec::number("left_first_ray"),
            FieldSpec::number("left_fifth_ray"),
            FieldSpec::number("right_y_rib"),
            FieldSpec::number("right_k_rib"),
            FieldSpec::number("right_cuboid"),
            FieldSpec::number("right_styloid"),
            FieldSpec::number("right_navicular"),
            FieldSpec::number("right_first_ray"),
            FieldSpec::number("right_fifth_ray"),
        ];
        FIELDS
    }

    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        for (field, value) in self.measurements() {
            if !(0.0..=MAX_PLANTAR_MODIFIER_MM).contains(&value) {
                errors.add(
                    field,
                    format!("Value must be between 0 and {MAX_PLANTAR_MODIFIER_MM} mm."),
                );
            }
        }
        errors.into_result()
    }
}

impl DetailRecord for PlantarModifier {
    const KIND: DetailKind = DetailKind::PlantarModifiers;
}

/// Heel and forefoot posting for each foot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Posting {
    pub left_heel_post_width: HeelPostWidth,
    pub left_heel_post_angle: f64,
    pub left_heel_post_pitch: f64,
    pub left_heel_post_raise: f64,
    pub left_heel_post_taper: f64,
    pub left_forefoot_post_width: ForefootPostWidth,
    pub left_forefoot_post_medial: bool,
    pub left_forefoot_post_lateral: bool,
    pub left_forefoot_post_angle: f64,
    pub right_heel_post_width: HeelPostWidth,
    pub right_heel_post_angle: f64,
    pub right_heel_post_pitch: f64,
    pub right_heel_post_raise: f64,
    pub right_heel_post_taper: f64,
    pub right_forefoot_post_width: ForefootPostWidth,
    pub right_forefoot_post_medial: bool,
    pub right_forefoot_post_lateral: bool,
    pub right_forefoot_post_angle: f64,
}

impl FieldSchema for Posting {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::choice("left_heel_post_width", HeelPostWidth::CHOICES, HeelPostWidth::default_str()),
            FieldSpec::number("left_heel_post_angle"),
            FieldSpec::number("left_heel_post_pitch"),
            FieldSpec::number("left_heel_post_raise"),
            FieldSpec::number("left_heel_post_taper"),
            FieldSpec::choice(
                "left_forefoot_post_width",
                ForefootPostWidth::CHOICES,
                ForefootPostWidth::default_str(),
            ),
            FieldSpec::boolean("left_forefoot_post_medial"),
            FieldSpec::boolean("left_forefoot_post_lateral"),
            FieldSpec::number("left_forefoot_post_angle"),
            FieldSpec::choice("right_heel_post_width", HeelPostWidth::CHOICES, HeelPostWidth::default_str()),
            FieldSpec::number("right_heel_post_angle"),
            FieldSpec::number("right_heel_post_pitch"),
            FieldSpec::number("right_heel_post_raise"),
            FieldSpec::number("right_heel_post_taper"),
            FieldSpec::choice(
                "right_forefoot_post_width",
                ForefootPostWidth::CHOICES,
                ForefootPostWidth::default_str(),
            ),
            FieldSpec::boolean("right_forefoot_post_medial"),
            FieldSpec::boolean("right_forefoot_post_lateral"),
            FieldSpec::number("right_forefoot_post_angle"),
        ];
        FIELDS
    }
}

impl DetailRecord for Posting {
    const KIND: DetailKind = DetailKind::Postings;
}

/// Shell and cover materials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MaterialSelection {
    pub shell_material: ShellMaterial,
    pub shell_thickness: ShellThickness,
    pub top_cover: CoverMaterial,
    pub second_cover: CoverMaterial,
    pub third_cover: CoverMaterial,
    pub full_length_plantar_cover: PlantarCover,
    pub cover_length: CoverLength,
    pub extension_forefoot: bool,
    pub extension_midfoot_medial: bool,
    pub extension_midfoot_lateral: bool,
}

impl Default for MaterialSelection {
    fn default() -> Self {
        Self {
            shell_material: ShellMaterial::default(),
            shell_thickness: ShellThickness::default(),
            top_cover: CoverMaterial::Eva120Black2mm,
            second_cover: CoverMaterial::None,
            third_cover: CoverMaterial::None,
            full_length_plantar_cover: PlantarCover::default(),
            cover_length: CoverLength::default(),
            extension_forefoot: false,
            extension_midfoot_medial: false,
            extension_midfoot_lateral: false,
        }
    }
}

impl FieldSchema for MaterialSelection {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::choice("shell_material", ShellMaterial::CHOICES, ShellMaterial::default_str()),
            FieldSpec::choice("shell_thickness", ShellThickness::CHOICES, ShellThickness::default_str()),
            FieldSpec::choice("top_cover", CoverMaterial::CHOICES, CoverMaterial::Eva120Black2mm.as_str()),
            FieldSpec::choice("second_cover", CoverMaterial::CHOICES, CoverMaterial::None.as_str()),
            FieldSpec::choice("third_cover", CoverMaterial::CHOICES, CoverMaterial::None.as_str()),
            FieldSpec::choice(
                "full_length_plantar_cover",
                PlantarCover::CHOICES,
                PlantarCover::default_str(),
            ),
            FieldSpec::choice("cover_length", CoverLength::CHOICES, CoverLength::default_str()),
            FieldSpec::boolean("extension_forefoot"),
            FieldSpec::boolean("extension_midfoot_medial"),
            FieldSpec::boolean("extension_midfoot_lateral"),
        ];
        FIELDS
    }
}

impl DetailRecord for MaterialSelection {
    const KIND: DetailKind = DetailKind::MaterialSelection;
}

/// Footwear the device must fit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShoeFitting {
    pub sizing_style: SizingStyle,
    pub orthosis_size: String,
    pub to_fit_shoe: String,
}

impl FieldSchema for ShoeFitting {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::choice("sizing_style", SizingStyle::CHOICES, SizingStyle::default_str()),
            FieldSpec::text("orthosis_size"),
            FieldSpec::text("to_fit_shoe"),
        ];
        FIELDS
    }
}

impl DetailRecord for ShoeFitting {
    const KIND: DetailKind = DetailKind::ShoeFitting;
}

/// Explicit device dimensions, in mm.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceOption {
    pub medial_arch_height: Option<f64>,
    pub lateral_arch_height: Option<f64>,
    pub medial_heel_height: Option<f64>,
    pub lateral_heel_height: Option<f64>,
    pub heel_width: Option<f64>,
    pub midfoot_width: Option<f64>,
    pub forefoot_width: Option<f64>,
}

impl FieldSchema for DeviceOption {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::optional_number("medial_arch_height"),
            FieldSpec::optional_number("lateral_arch_height"),
            FieldSpec::optional_number("medial_heel_height"),
            FieldSpec::optional_number("lateral_heel_height"),
            FieldSpec::optional_number("heel_width"),
            FieldSpec::optional_number("midfoot_width"),
            FieldSpec::optional_number("forefoot_width"),
        ];
        FIELDS
    }
}

impl DetailRecord for DeviceOption {
    const KIND: DetailKind = DetailKind::DeviceOptions;
}

/// Administration and notes, edited like a detail record but stored on the
/// prescription row. Lookup references are option ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Administration {
    pub status: Option<String>,
    pub foot_type: Option<String>,
    pub wear_time: Option<String>,
    pub activity_level: Option<String>,
    pub turnaround: Turnaround,
    pub contact_clinician: bool,
    pub confirm_before_manufacture: bool,
    pub clinician_computer_aided_design: bool,
    pub general_notes: String,
    pub left_foot_notes: String,
    pub right_foot_notes: String,
}

impl FieldSchema for Administration {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::optional_text("status"),
            FieldSpec::optional_text("foot_type"),
            FieldSpec::optional_text("wear_time"),
            FieldSpec::optional_text("activity_level"),
            FieldSpec::choice("turnaround", Turnaround::CHOICES, Turnaround::default_str()),
            FieldSpec::boolean("contact_clinician"),
            FieldSpec::boolean("confirm_before_manufacture"),
            FieldSpec::boolean("clinician_computer_aided_design"),
            FieldSpec::text("general_notes"),
            FieldSpec::text("left_foot_notes"),
            FieldSpec::text("right_foot_notes"),
        ];
        FIELDS
    }
}
