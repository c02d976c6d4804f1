//! Hospital knowledge base
//!
//! Static lookup tables for hospital facts, doctors, departments and the
//! second-opinion service, each exposed as a preformatted-text function.
//! The model fetches these on demand through tool calls instead of carrying
//! the data in its instructions.

/// Hospital name used in the greeting and the system instructions.
pub const HOSPITAL_NAME: &str = "Delhi Hospital";

pub const HOSPITAL_ADDRESS: &str =
    "Sampla Road, Near Prince Hotel, Kharkhoda, Sonipat, Haryana 131402";
pub const HOSPITAL_LANDMARK: &str = "Near Prince Hotel, on Sampla/Kharkhoda Main Road";
pub const PRIMARY_PHONE: &str = "+91 99849 41611";
pub const SECONDARY_PHONE: &str = "+91 97290 17553";
pub const ALTERNATE_PHONE: &str = "+91 98133 79592";
pub const HOSPITAL_EMAIL: &str = "delhihospitalkkd@gmail.com";
pub const HOSPITAL_WEBSITE: &str = "delhihospital.co.in";

pub const FACILITIES: &[&str] = &[
    "24x7 Emergency & Trauma Services",
    "Fully Equipped ICU & Critical Care",
    "Advanced Pathology Lab",
    "Digital X-ray & Ultrasound",
    "Modern Operation Theatres",
    "In-house Pharmacy",
    "Private & Semi-private Rooms",
    "24x7 Ambulance Service",
];

/// Symptoms that route straight to the emergency room.
pub const EMERGENCY_SYMPTOMS: &[&str] = &[
    "severe chest pain",
    "difficulty breathing",
    "breathlessness with sweating",
    "stroke symptoms",
    "sudden weakness one side",
    "slurred speech",
    "uncontrolled bleeding",
    "major injury",
    "loss of consciousness",
    "severe burns",
    "chemical in eye",
    "sudden vision loss",
    "pregnant with bleeding",
    "severe abdominal pain with vomiting",
    "high fever with confusion",
    "seizure",
    "poisoning",
];

#[derive(Debug, Clone, Copy)]
pub struct Doctor {
    pub name: &'static str,
    pub designation: &'static str,
    pub specialization: &'static str,
    pub timings: &'static str,
    pub consultation_fee: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct Department {
    pub key: &'static str,
    pub name: &'static str,
    /// Conditions this department handles; empty for internal departments
    /// that are not directly bookable.
    pub handles: &'static [&'static str],
    pub doctors: &'static [Doctor],
}

pub static DEPARTMENTS: &[Department] = &[
    Department {
        key: "orthopedics",
        name: "Orthopedics & Joint Replacement",
        handles: &[
            "fractures",
            "joint pain",
            "arthritis",
            "ligament injuries",
            "knee pain",
            "hip pain",
            "back pain",
            "spine issues",
            "sports injury",
        ],
        doctors: &[Doctor {
            name: "Dr. Anil Sharma",
            designation: "Joint Replacement & Orthopaedics Specialist",
            specialization: "Joint Replacement, Fractures, Arthritis, Sports Injuries",
            timings: "Please confirm with reception",
            consultation_fee: "Confirm with reception",
        }],
    },
    Department {
        key: "ent",
        name: "ENT (Ear, Nose, Throat)",
        handles: &[
            "ear pain",
            "ear discharge",
            "hearing loss",
            "sinus",
            "sore throat",
            "tonsils",
            "vertigo",
            "nose block",
        ],
        doctors: &[Doctor {
            name: "Dr. Ravi Shankar",
            designation: "ENT Specialist",
            specialization: "Ear, Nose, Throat disorders, Sinus, Vertigo",
            timings: "Please confirm with reception",
            consultation_fee: "Confirm with reception",
        }],
    },
    Department {
        key: "eye",
        name: "Ophthalmology (Eye)",
        handles: &[
            "eye redness",
            "eye pain",
            "blurred vision",
            "itching",
            "eye infection",
            "vision checkup",
        ],
        doctors: &[Doctor {
            name: "Dr. Divya Dhingra",
            designation: "Eye Specialist",
            specialization: "Eye Care, Vision Problems, Eye Infections",
            timings: "Please confirm with reception",
            consultation_fee: "Confirm with reception",
        }],
    },
    Department {
        key: "gynecology",
        name: "Gynaecology & Obstetrics",
        handles: &[
            "pregnancy",
            "periods problem",
            "menstrual issues",
            "white discharge",
            "PCOS",
            "fertility",
            "women health",
        ],
        doctors: &[Doctor {
            name: "Dr. Mamta Sharma",
            designation: "Gynaecologist",
            specialization: "Pregnancy Care, Menstrual Problems, PCOS, Women's Health",
            timings: "Please confirm with reception",
            consultation_fee: "Confirm with reception",
        }],
    },
    Department {
        key: "pediatrics",
        name: "Pediatrics (Child Care)",
        handles: &[
            "child fever",
            "baby health",
            "vaccination",
            "child cough",
            "growth issues",
            "newborn care",
        ],
        doctors: &[Doctor {
            name: "Dr. S Kumar",
            designation: "Paediatrician",
            specialization: "Child Health, Vaccinations, Growth & Development",
            timings: "Please confirm with reception",
            consultation_fee: "Confirm with reception",
        }],
    },
    Department {
        key: "urology",
        name: "Urology",
        handles: &[
            "kidney stone",
            "burning urination",
            "urine problem",
            "prostate",
            "blood in urine",
        ],
        doctors: &[Doctor {
            name: "Dr. Anil Aggarwal",
            designation: "Urologist",
            specialization: "Kidney Stones, Urinary Problems, Prostate Issues",
            timings: "Please confirm with reception",
            consultation_fee: "Confirm with reception",
        }],
    },
    Department {
        key: "plastic_surgery",
        name: "Plastic, Cosmetic & Burn Surgery",
        handles: &["burns", "scars", "cosmetic surgery", "reconstructive surgery"],
        doctors: &[Doctor {
            name: "Dr. Tapeshwar Shegal",
            designation: "Burn, Cosmetic & Plastic Surgeon",
            specialization: "Burns, Scar Revision, Cosmetic & Reconstructive Surgery",
            timings: "Please confirm with reception",
            consultation_fee: "Confirm with reception",
        }],
    },
    Department {
        key: "general_surgery",
        name: "General & Laparoscopic Surgery",
        handles: &["hernia", "gallbladder", "appendix", "piles", "fissure", "surgery"],
        doctors: &[Doctor {
            name: "Dr. Shushant Verma",
            designation: "General & Laparoscopic Surgeon",
            specialization: "Hernia, Gallbladder, Appendix, Piles, Laparoscopic Surgery",
            timings: "Please confirm with reception",
            consultation_fee: "Confirm with reception",
        }],
    },
    Department {
        key: "physiotherapy",
        name: "Physiotherapy & Rehabilitation",
        handles: &[
            "physio",
            "rehab",
            "exercise",
            "stiffness",
            "post surgery rehab",
            "stroke rehab",
        ],
        doctors: &[Doctor {
            name: "Dr. Vinay Chand",
            designation: "Physiotherapist",
            specialization: "Post-surgery Rehab, Joint Stiffness, Sports Rehab",
            timings: "Please confirm with reception",
            consultation_fee: "Confirm with reception",
        }],
    },
    Department {
        key: "radiology",
        name: "Radiology & Imaging",
        handles: &["xray", "ultrasound", "imaging", "scan"],
        doctors: &[Doctor {
            name: "Dr. Ruchi Sharma",
            designation: "Radiologist",
            specialization: "X-ray, Ultrasound, Diagnostic Imaging",
            timings: "Please confirm with reception",
            consultation_fee: "On prescription from doctor",
        }],
    },
    Department {
        key: "diet",
        name: "Diet & Nutrition",
        handles: &["diet", "weight", "nutrition", "diabetes diet", "heart diet"],
        doctors: &[Doctor {
            name: "Vanshika Dahiya",
            designation: "Dietician",
            specialization: "Weight Management, Diabetes Diet, Heart-healthy Diet",
            timings: "Please confirm with reception",
            consultation_fee: "Confirm with reception",
        }],
    },
    Department {
        // Internal, not for direct booking.
        key: "anaesthesia",
        name: "Anaesthesia (Internal)",
        handles: &[],
        doctors: &[Doctor {
            name: "Dr. Amit Sahu",
            designation: "Anaesthetist",
            specialization: "Surgery Support, ICU, Procedures",
            timings: "Part of surgical/ICU team",
            consultation_fee: "N/A - Internal use only",
        }],
    },
];

/// Brief list of all bookable doctors with their departments.
pub fn all_doctors_summary() -> String {
    let mut lines = Vec::new();
    for dept in DEPARTMENTS.iter().filter(|d| !d.handles.is_empty()) {
        for doctor in dept.doctors {
            lines.push(format!("- {} - {}", doctor.name, dept.name));
        }
    }
    lines.join("\n")
}

/// Detailed info about a specific doctor; matches on a name fragment.
pub fn doctor_details(doctor_name: &str) -> String {
    let query = doctor_name.to_lowercase();
    if query.trim().is_empty() {
        return "Doctor not found. Please check the name or ask reception.".to_string();
    }
    for dept in DEPARTMENTS {
        for doctor in dept.doctors {
            if doctor.name.to_lowercase().contains(&query) {
                return format!(
                    "Doctor: {}\nDepartment: {}\nDesignation: {}\nSpecialization: {}\nTimings: {}\nFee: {}",
                    doctor.name,
                    dept.name,
                    doctor.designation,
                    doctor.specialization,
                    doctor.timings,
                    doctor.consultation_fee
                );
            }
        }
    }
    "Doctor not found. Please check the name or ask reception.".to_string()
}

/// Info about a department; matches key or display name.
pub fn department_info(department: &str) -> String {
    let query = department.to_lowercase();
    if query.trim().is_empty() {
        return "Department not found.".to_string();
    }
    for dept in DEPARTMENTS {
        if dept.key.contains(&query) || dept.name.to_lowercase().contains(&query) {
            let doctors: Vec<String> = dept
                .doctors
                .iter()
                .map(|d| format!("  - {} - {}", d.name, d.designation))
                .collect();
            let conditions = if dept.handles.is_empty() {
                "N/A".to_string()
            } else {
                dept.handles.join(", ")
            };
            return format!(
                "Department: {}\nConditions Treated: {}\nDoctors:\n{}",
                dept.name,
                conditions,
                doctors.join("\n")
            );
        }
    }
    "Department not found.".to_string()
}

/// Hospital contact and timing info.
pub fn hospital_info() -> String {
    format!(
        "Hospital: {}\nAddress: {}\nLandmark: {}\nPhone: {}\nAlt Phones: {}, {}\nEmail: {}\nWebsite: {}\nEmergency: 24x7\nOPD: Daytime hours - confirm with reception for specific doctor",
        HOSPITAL_NAME,
        HOSPITAL_ADDRESS,
        HOSPITAL_LANDMARK,
        PRIMARY_PHONE,
        SECONDARY_PHONE,
        ALTERNATE_PHONE,
        HOSPITAL_EMAIL,
        HOSPITAL_WEBSITE
    )
}

/// Hospital facilities list.
pub fn facilities() -> String {
    let lines: Vec<String> = FACILITIES.iter().map(|f| format!("- {}", f)).collect();
    format!("Hospital Facilities:\n{}", lines.join("\n"))
}

/// Every bookable department with the conditions it handles, for the model
/// to pick the best match for a caller's symptoms.
pub fn specialties_for_routing() -> String {
    let mut lines = vec![
        "Departments and the conditions they handle:".to_string(),
    ];
    for dept in DEPARTMENTS.iter().filter(|d| !d.handles.is_empty()) {
        lines.push(format!("- {}: {}", dept.name, dept.handles.join(", ")));
    }
    lines.push(format!(
        "EMERGENCY symptoms ({} and similar): send to ER immediately, call {}",
        EMERGENCY_SYMPTOMS[..3].join(", "),
        PRIMARY_PHONE
    ));
    lines.join("\n")
}

/// Details of the free second-opinion service.
pub fn second_opinion_info() -> String {
    format!(
        "Free Second Opinion Service\nWebsite: secondopinion.org\nCost: Completely FREE (online + offline appointment)\n\n\
{} offers a FREE Second Opinion Service. Start online by uploading your reports, and get a FREE in-person appointment at the hospital. \
Senior specialists review your case and guide you on whether surgery or treatment is actually needed. No charges at any step.\n\n\
HOW IT WORKS:\n\
1. Visit secondopinion.org or WhatsApp your reports to {}\n\
2. Upload your medical reports (X-ray, MRI, prescriptions, etc.)\n\
3. Senior doctors review your case within 24-48 hours\n\
4. You get a FREE offline appointment at {}\n\
5. Meet the specialist in-person for final consultation - absolutely free\n\n\
WHO SHOULD USE:\n\
- Patients advised for surgery who want confirmation\n\
- People with joint, spine, or arthritis issues\n\
- Cases with confusing or conflicting reports\n\
- Anyone wanting expert opinion before starting treatment\n\n\
CONTACT:\nWhatsApp/Phone: {}\nWebsite: secondopinion.org",
        HOSPITAL_NAME, PRIMARY_PHONE, HOSPITAL_NAME, PRIMARY_PHONE
    )
}
