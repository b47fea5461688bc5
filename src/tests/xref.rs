use std::collections::BTreeSet;
use std::rc::Rc;

use crate::analysis::{
    is_ascii_obfuscation, Analysis, DexContainer, MethodAnalysis, MethodOrigin, RefType, SourceProvider, XrefLinked,
};
use crate::config::Config;
use crate::dex::{DexFile, ErrorKind};
use crate::tests::builder::*;
use crate::tests::{sample_app, CLOCK, HELPER, INNER, MAIN};

fn analysed() -> Analysis<XrefLinked> {
    let mut a = Analysis::new();
    a.add(DexFile::load(&sample_app().build()).unwrap());
    a.create_xref()
}

fn method<'a>(a: &'a Analysis<XrefLinked>, class: &str, name: &str, descriptor: &str) -> &'a MethodAnalysis {
    a.get_method_analysis_by_name(class, name, descriptor).unwrap()
}

#[test]
fn external_classes_are_created_once()
{
    let a = analysed();
    let mut external: Vec<&str> = a.get_external_classes().iter().map(|c| c.name()).collect();
    external.sort_unstable();
    assert_eq!(external, vec![CLOCK, HELPER, "Ljava/lang/Object;", "Ljava/lang/String;"]);

    let helper = a.get_class_analysis(HELPER).unwrap();
    assert!(helper.is_external());
    assert_eq!(helper.extends(), Some("Ljava/lang/Object;"));
    assert!(helper.implements().is_empty());
    assert!(!helper.is_android_api());
    assert!(a.get_class_analysis(CLOCK).unwrap().is_android_api());

    // <init> and greet, each stubbed once although called from two sites
    let names: BTreeSet<&str> = helper.get_methods().iter().map(|k| a.method(*k).unwrap().name()).collect();
    assert_eq!(names, BTreeSet::from(["<init>", "greet"]));
    assert_eq!(a.get_external_methods().len(), 4);
    assert_eq!(a.get_internal_methods().len(), 5);
}

#[test]
fn method_xrefs_both_ways()
{
    let a = analysed();
    let main = a.get_class_analysis(MAIN).unwrap().key();
    let inner = a.get_class_analysis(INNER).unwrap().key();
    let run = method(&a, MAIN, "run", "()V");
    let helper = method(&a, MAIN, "helper", "()V");
    let greet = method(&a, HELPER, "greet", "(Ljava/lang/String;)V");
    let go = method(&a, INNER, "go", "()V");

    assert_eq!(run.get_xref_to().len(), 5);
    assert!(run.get_xref_to().contains(&(main, helper.key(), 34)));
    assert!(run.get_xref_to().contains(&(main, helper.key(), 40)));
    assert_eq!(
        helper.get_xref_from().iter().cloned().collect::<Vec<_>>(),
        vec![(main, run.key(), 34), (main, run.key(), 40)]
    );
    assert!(greet.is_external());
    assert!(greet.get_xref_from().contains(&(main, run.key(), 14)));
    assert_eq!(run.get_xref_from().iter().cloned().collect::<Vec<_>>(), vec![(inner, go.key(), 0)]);
}

#[test]
fn class_xrefs_carry_the_reference_kind()
{
    let a = analysed();
    let main = a.get_class_analysis(MAIN).unwrap();
    let helper = a.get_class_analysis(HELPER).unwrap();
    let run = method(&a, MAIN, "run", "()V").key();
    let greet = method(&a, HELPER, "greet", "(Ljava/lang/String;)V").key();
    let init = method(&a, HELPER, "<init>", "()V").key();

    let to = &main.get_xref_to()[&helper.key()];
    let expected: BTreeSet<(RefType, _, usize)> =
        [(RefType::NewInstance, run, 4), (RefType::InvokeDirect, init, 8), (RefType::InvokeVirtual, greet, 14)]
            .into_iter()
            .collect();
    assert_eq!(to, &expected);

    let from = &helper.get_xref_from()[&main.key()];
    assert!(from.iter().all(|(_, m, _)| *m == run));
    assert_eq!(from.len(), 3);

    assert_eq!(helper.get_xref_new_instance().iter().cloned().collect::<Vec<_>>(), vec![(run, 4)]);
    let string = a.get_class_analysis("Ljava/lang/String;").unwrap();
    assert_eq!(string.get_xref_const_class().iter().cloned().collect::<Vec<_>>(), vec![(run, 46)]);
    let run = method(&a, MAIN, "run", "()V");
    assert!(run.get_xref_const_class().contains(&(string.key(), 46)));
    assert!(run.get_xref_new_instance().contains(&(helper.key(), 4)));
    assert_eq!(RefType::from_op_value(0x74), Some(RefType::InvokeVirtualRange));
    assert_eq!(RefType::InvokeInterface.op_value(), 0x72);
}

#[test]
fn field_and_string_xrefs()
{
    let a = analysed();
    let main = a.get_class_analysis(MAIN).unwrap().key();
    let run = method(&a, MAIN, "run", "()V").key();
    let helper = method(&a, MAIN, "helper", "()V").key();

    let count = a.find_fields(MAIN, "count", ".*", ".*").unwrap()[0];
    assert_eq!(count.get_xref_read(true).into_iter().collect::<Vec<_>>(), vec![(main, run, Some(20))]);
    assert_eq!(count.get_xref_write(true).into_iter().collect::<Vec<_>>(), vec![(main, run, Some(24))]);
    assert_eq!(count.get_xref_write(false).into_iter().collect::<Vec<_>>(), vec![(main, run, None)]);

    let name = a.find_fields(MAIN, "name", "Ljava/lang/String;", "private").unwrap()[0];
    assert_eq!(name.get_xref_read(false).into_iter().collect::<Vec<_>>(), vec![(main, helper, None)]);
    assert!(name.get_xref_write(true).is_empty());
    let helper_m = a.method(helper).unwrap();
    assert!(helper_m.get_xref_read().contains(&(main, name.key(), 0)));

    let hello = a.find_strings("hel").unwrap()[0];
    assert_eq!(hello.get_value(), "hello");
    assert_eq!(hello.get_xref_from(true).into_iter().collect::<Vec<_>>(), vec![(main, run, Some(0))]);
    let unused = a.get_strings_analysis()["unused"];
    assert!(unused.get_xref_from(false).is_empty());
}

#[test]
fn lookups_by_view_and_name()
{
    let a = analysed();
    let dex = a.get_vms()[0].clone();
    let run = dex.get_method_descriptor(MAIN, "run", "()V").unwrap();
    let ma = a.get_method(&run).unwrap();
    assert_eq!(ma.full_name(), "LMain; run ()V");
    assert_eq!(ma.access(), "public");
    assert_eq!(ma.get_length(), 26);
    assert!(matches!(ma.get_origin(), MethodOrigin::Internal { vm: 0, .. }));

    let field = dex.get_encoded_field_descriptor(MAIN, "count", "I").unwrap();
    assert_eq!(a.get_field_analysis(&field).unwrap().name(), "count");

    assert!(a.get_method_by_name(MAIN, "run", "()V").is_some());
    assert!(a.get_method_by_name(HELPER, "greet", "(Ljava/lang/String;)V").is_none());
    assert!(a.is_class_present(HELPER));
    assert!(!a.is_class_present("LAbsent;"));
}

#[test]
fn finders_match_from_the_start()
{
    let a = analysed();
    let names = |v: Vec<&crate::analysis::ClassAnalysis>| v.iter().map(|c| c.name().to_string()).collect::<Vec<_>>();

    assert_eq!(names(a.find_classes("LMain", false).unwrap()), vec![MAIN, INNER]);
    assert_eq!(names(a.find_classes("Main", false).unwrap()), Vec::<String>::new());
    assert_eq!(names(a.find_classes("Ljava/", true).unwrap()), Vec::<String>::new());
    assert_eq!(a.find_classes("Ljava/", false).unwrap().len(), 2);

    let statics: Vec<&str> = a.find_methods(MAIN, ".*", ".*", ".*static", true).unwrap().into_iter().map(|m| m.name()).collect();
    assert_eq!(statics, vec!["helper"]);
    let externals = a.find_methods(HELPER, ".*", ".*", ".*", false).unwrap();
    assert_eq!(externals.len(), 2);
    assert!(a.find_methods(HELPER, ".*", ".*", ".*", true).unwrap().is_empty());

    assert_eq!(a.find_classes("(", false).unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn basic_blocks_are_built_on_demand()
{
    let a = analysed();
    let run = method(&a, MAIN, "run", "()V");
    let bbs = run.get_basic_blocks().unwrap();
    assert_eq!(bbs.len(), 1);
    assert_eq!(bbs.get(0).unwrap().get_nb_instructions(), 11);
    assert_eq!(bbs.get(0).unwrap().get_name(), "run-BB@0x0");

    assert!(method(&a, HELPER, "greet", "(Ljava/lang/String;)V").get_basic_blocks().is_none());
    assert!(method(&a, MAIN, "nativeStuff", "(I J)V").get_basic_blocks().is_none());
}

struct Names;

impl SourceProvider for Names {
    fn get_source(&self, method: &MethodAnalysis) -> Option<String> {
        Some(format!("void {}() {{}}", method.name()))
    }
}

#[test]
fn decompiler_feeds_internal_methods()
{
    let mut a = analysed();
    assert_eq!(method(&a, MAIN, "run", "()V").get_source(), None);
    a.set_decompiler(Rc::new(Names));
    assert_eq!(method(&a, MAIN, "run", "()V").get_source().as_deref(), Some("void run() {}"));
    assert_eq!(method(&a, HELPER, "greet", "(Ljava/lang/String;)V").get_source(), None);
}

#[test]
fn overwritten_strings_keep_their_original()
{
    let mut a = analysed();
    let s = a.get_string_analysis_mut("hello").unwrap();
    s.set_value("bye");
    assert!(s.is_overwritten());
    let s = a.find_strings("hello").unwrap()[0];
    assert_eq!(s.get_value(), "bye");
    assert_eq!(s.get_orig_value(), "hello");
}

#[test]
fn decompiler_reaches_files_added_later()
{
    let mut a = Analysis::new();
    a.set_decompiler(Rc::new(Names));
    a.add(DexFile::load(&sample_app().build()).unwrap());
    let a = a.create_xref();
    assert_eq!(method(&a, MAIN, "run", "()V").get_source().as_deref(), Some("void run() {}"));
    assert_eq!(method(&a, INNER, "go", "()V").get_source().as_deref(), Some("void go() {}"));
    assert_eq!(method(&a, HELPER, "greet", "(Ljava/lang/String;)V").get_source(), None);
}

struct TwoDex;

impl DexContainer for TwoDex {
    fn get_all_dex(&self) -> Vec<Vec<u8>> {
        let second = DexBuilder::new().class(
            ClassSpec::new("LSecond;").method(
                "call",
                "()V",
                ACC_STATIC,
                Some(Code::new(0, vec![Unit::Raw(0x0071), method_unit(MAIN, "helper", "()V"), Unit::Raw(0), Unit::Raw(0x000e)])),
            ),
        );
        vec![sample_app().build(), second.build()]
    }

    fn get_target_sdk_version(&self) -> u32 {
        28
    }
}

fn method_unit(class: &str, name: &str, sig: &str) -> Unit {
    crate::tests::builder::method(class, name, sig)
}

#[test]
fn calls_resolve_across_files()
{
    let a = Analysis::from_container(&TwoDex, Config::default()).unwrap().create_xref();
    assert_eq!(a.get_vms().len(), 2);
    let helper = method(&a, MAIN, "helper", "()V");
    assert!(!helper.is_external());
    let second = a.get_class_analysis("LSecond;").unwrap().key();
    let call = method(&a, "LSecond;", "call", "()V").key();
    assert!(helper.get_xref_from().contains(&(second, call, 0)));
    assert!(matches!(method(&a, "LSecond;", "call", "()V").get_origin(), MethodOrigin::Internal { vm: 1, .. }));
}

#[test]
fn non_ascii_names_flag_obfuscation()
{
    let plain = DexFile::load(&sample_app().build()).unwrap();
    assert!(!is_ascii_obfuscation(&plain));

    let odd = DexBuilder::new().class(ClassSpec::new("La;").method("\u{3b1}", "()V", ACC_STATIC, Some(Code::new(0, raw(&[0x000e])))));
    assert!(is_ascii_obfuscation(&DexFile::load(&odd.build()).unwrap()));
}
