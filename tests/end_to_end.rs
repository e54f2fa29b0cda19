//! End-to-end tests over synthetic fixture files through the public API.

mod common;

use common::*;
use rasp::{Error, Value, Workbook};

fn sample_xls() -> Vec<u8> {
    let globals = vec![
        (BOF, bof_payload(0x0005)),
        (XF, vec![0, 0, 0, 0]),
        (BOUNDSHEET8, boundsheet_payload(0, 0, "Data")),
        (SST, sst_payload(&["hello"])),
        (EOF, Vec::new()),
    ];
    let sheet = vec![
        (BOF, bof_payload(0x0010)),
        (DIMENSIONS, dimensions_payload(2, 2)),
        rk_int_record(0, 0, 0, 1),
        label_sst_record(0, 1, 0, 0),
        number_record(1, 0, 0, 3.14),
        bool_record(1, 1, 0, true),
        (EOF, Vec::new()),
    ];
    wrap_in_cfb(&workbook_stream(&globals, &[sheet]))
}

#[test]
fn xls_rows_as_strings() {
    let path = temp_file("basic.xls", &sample_xls());
    let mut workbook = rasp::open(&path).unwrap();
    assert!(matches!(workbook, Workbook::Xls(_)));
    assert_eq!(workbook.list(), vec!["Data".to_string()]);

    let sheet = workbook.get("Data").unwrap();
    assert!(!sheet.is_empty());
    let rows: Vec<Vec<String>> = sheet.rows().map(|r| r.strings()).collect();
    assert_eq!(rows, vec![vec!["1", "hello"], vec!["3.14", "TRUE"]]);
}

#[test]
fn xls_typed_scan() {
    let path = temp_file("scan.xls", &sample_xls());
    let mut workbook = rasp::open(&path).unwrap();
    let sheet = workbook.get("Data").unwrap();

    let mut rows = sheet.rows();
    let first = rows.next().unwrap();
    let (mut n, mut s) = (0i64, String::new());
    first.scan((&mut n, &mut s)).unwrap();
    assert_eq!((n, s.as_str()), (1, "hello"));

    let second = rows.next().unwrap();
    let (mut f, mut b) = (0f64, false);
    second.scan((&mut f, &mut b)).unwrap();
    assert_eq!((f, b), (3.14, true));

    // wrong destination type surfaces a scan error
    let mut date = chrono::NaiveDate::from_ymd_opt(2000, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let err = second.scan((&mut date,)).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
}

#[test]
fn xls_merged_region() {
    // anchor "X" over rows 0-1, cols 0-2
    let globals = vec![
        (BOF, bof_payload(0x0005)),
        (XF, vec![0, 0, 0, 0]),
        (BOUNDSHEET8, boundsheet_payload(0, 0, "M")),
        (SST, sst_payload(&["X"])),
        (EOF, Vec::new()),
    ];
    let sheet = vec![
        (BOF, bof_payload(0x0010)),
        (DIMENSIONS, dimensions_payload(2, 3)),
        label_sst_record(0, 0, 0, 0),
        merge_record(&[(0, 1, 0, 2)]),
        (EOF, Vec::new()),
    ];
    let path = temp_file(
        "merge.xls",
        &wrap_in_cfb(&workbook_stream(&globals, &[sheet])),
    );

    let mut workbook = rasp::open(&path).unwrap();
    let sheet = workbook.get("M").unwrap();
    let rows: Vec<Vec<String>> = sheet.rows().map(|r| r.strings()).collect();
    assert_eq!(rows[0], vec!["X", "→", "⇥"]);
    assert_eq!(rows[1], vec!["⤓", "→", "⇥"]);
}

#[test]
fn xls_zero_extent_sheet_is_empty() {
    let globals = vec![
        (BOF, bof_payload(0x0005)),
        (BOUNDSHEET8, boundsheet_payload(0, 0, "Empty")),
        (EOF, Vec::new()),
    ];
    let sheet = vec![
        (BOF, bof_payload(0x0010)),
        (DIMENSIONS, dimensions_payload(0, 0)),
        (EOF, Vec::new()),
    ];
    let path = temp_file(
        "empty.xls",
        &wrap_in_cfb(&workbook_stream(&globals, &[sheet])),
    );
    let mut workbook = rasp::open(&path).unwrap();
    assert!(workbook.get("Empty").unwrap().is_empty());
}

#[test]
fn xls_user_format_and_1904_dates() {
    // "Format" record defines a date code; XF 1 points at it
    let mut format_payload = 164u16.to_le_bytes().to_vec();
    let code = "yyyy-mm-dd";
    format_payload.extend_from_slice(&(code.len() as u16).to_le_bytes());
    format_payload.push(0x00);
    format_payload.extend_from_slice(code.as_bytes());

    let globals = vec![
        (BOF, bof_payload(0x0005)),
        (DATE1904, 1u16.to_le_bytes().to_vec()),
        (FORMAT, format_payload),
        (XF, vec![0, 0, 0, 0]),
        (XF, vec![0, 0, 164, 0]),
        (BOUNDSHEET8, boundsheet_payload(0, 0, "D")),
        (EOF, Vec::new()),
    ];
    let sheet = vec![
        (BOF, bof_payload(0x0010)),
        (DIMENSIONS, dimensions_payload(1, 1)),
        number_record(0, 0, 1, 2.5),
        (EOF, Vec::new()),
    ];
    let path = temp_file(
        "dates.xls",
        &wrap_in_cfb(&workbook_stream(&globals, &[sheet])),
    );
    let mut workbook = rasp::open(&path).unwrap();
    let rows: Vec<Vec<String>> = workbook
        .get("D")
        .unwrap()
        .rows()
        .map(|r| r.strings())
        .collect();
    assert_eq!(rows[0], vec!["1904-01-03"]);
}

#[test]
fn xls_sheet_not_found() {
    let path = temp_file("nosheet.xls", &sample_xls());
    let mut workbook = rasp::open(&path).unwrap();
    assert!(matches!(
        workbook.get("Missing"),
        Err(Error::SheetNotFound(_))
    ));
}

fn sample_xlsx() -> Vec<u8> {
    build_xlsx(&[
        (
            "_rels/.rels",
            r#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#,
        ),
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets>
<sheet name="First" sheetId="1" r:id="rId1"/>
<sheet name="Ghost" sheetId="2" state="hidden" r:id="rId1"/>
</sheets>
</workbook>"#,
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>
</Relationships>"#,
        ),
        (
            "xl/styles.xml",
            r#"<?xml version="1.0"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<numFmts count="1"><numFmt numFmtId="164" formatCode="0.00"/></numFmts>
<cellXfs count="3">
<xf numFmtId="0"/>
<xf numFmtId="164" applyNumberFormat="1"/>
<xf numFmtId="14" applyNumberFormat="1"/>
</cellXfs>
</styleSheet>"#,
        ),
        (
            "xl/sharedStrings.xml",
            r#"<?xml version="1.0"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="2" uniqueCount="2">
<si><t>hello</t></si>
<si><r><t>wo</t></r><r><t>rld</t></r></si>
</sst>"#,
        ),
        (
            "xl/worksheets/_rels/sheet1.xml.rels",
            r#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com/" TargetMode="External"/>
</Relationships>"#,
        ),
        (
            "xl/worksheets/sheet1.xml",
            r#"<?xml version="1.0"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<dimension ref="A1:C3"/>
<sheetData>
<row r="1">
<c r="A1" t="s"><v>0</v></c>
<c r="B1" s="1"><v>2.5</v></c>
<c r="C1" t="b"><v>1</v></c>
</row>
<row r="2">
<c r="A2" s="2"><v>25569</v></c>
<c r="B2" t="e"><v>#DIV/0!</v></c>
<c r="C2" t="inlineStr"><is><t>inline</t></is></c>
</row>
<row r="3">
<c r="A3" t="s"><v>1</v></c>
<c r="C3" t="s"><v>0</v></c>
</row>
</sheetData>
<mergeCells count="1"><mergeCell ref="A3:B3"/></mergeCells>
<hyperlinks><hyperlink ref="C3" r:id="rId9"/></hyperlinks>
</worksheet>"#,
        ),
    ])
}

#[test]
fn xlsx_end_to_end() {
    let path = temp_file("basic.xlsx", &sample_xlsx());
    let mut workbook = rasp::open(&path).unwrap();
    assert!(matches!(workbook, Workbook::Xlsx(_)));
    // the hidden sheet is not listed
    assert_eq!(workbook.list(), vec!["First".to_string()]);

    let sheet = workbook.get("First").unwrap();
    let rows: Vec<Vec<String>> = sheet.rows().map(|r| r.strings()).collect();
    assert_eq!(rows[0], vec!["hello", "2.50", "TRUE"]);
    assert_eq!(rows[1], vec!["01-01-70", "#DIV/0!", "inline"]);
    assert_eq!(
        rows[2],
        vec!["world", "⇥", "hello <https://example.com/>"]
    );
}

#[test]
fn xlsx_typed_cells() {
    let path = temp_file("typed.xlsx", &sample_xlsx());
    let mut workbook = rasp::open(&path).unwrap();
    let sheet = workbook.get("First").unwrap();

    assert_eq!(
        sheet.cell(0, 0).unwrap().value,
        Value::String("hello".into())
    );
    // custom format 164 is numeric, so the raw float is kept
    assert_eq!(sheet.cell(0, 1).unwrap().value, Value::Float(2.5));
    assert_eq!(sheet.cell(0, 2).unwrap().value, Value::Bool(true));
    // builtin 14 implies a date cell
    assert!(matches!(sheet.cell(1, 0).unwrap().value, Value::Date(_)));
    assert!(matches!(
        sheet.cell(2, 2).unwrap().value,
        Value::Hyperlink { .. }
    ));
}

#[test]
fn delimited_files() {
    let path = temp_file("table.csv", b"a,b,c\n1,2,3\n4,5,6\n");
    let mut workbook = rasp::open(&path).unwrap();
    assert!(matches!(workbook, Workbook::Delimited(_)));
    let names = workbook.list();
    let sheet = workbook.get(&names[0]).unwrap();
    let rows: Vec<Vec<String>> = sheet.rows().map(|r| r.strings()).collect();
    assert_eq!(rows[1], vec!["1", "2", "3"]);

    let path = temp_file("table.tsv", b"x\ty\n7\t8\n");
    let mut workbook = rasp::open(&path).unwrap();
    let names = workbook.list();
    let rows: Vec<Vec<String>> = workbook
        .get(&names[0])
        .unwrap()
        .rows()
        .map(|r| r.strings())
        .collect();
    assert_eq!(rows, vec![vec!["x", "y"], vec!["7", "8"]]);
}

#[test]
fn unknown_format_reported() {
    let path = temp_file(
        "mystery.bin",
        b"just some prose, nothing tabular\nanother line\nand a, third, one\n",
    );
    let err = rasp::open(&path).err().expect("open should fail");
    assert!(matches!(err, Error::UnknownFormat), "{err}");
}

#[test]
fn corrupt_xls_is_fatal_not_skipped() {
    // valid CFB magic but an oversized record inside the stream: the
    // xls probe recognized the container, so the error is fatal
    let mut bad_stream = Vec::new();
    push_record(&mut bad_stream, BOF, &bof_payload(0x0005));
    bad_stream.extend_from_slice(&NUMBER.to_le_bytes());
    bad_stream.extend_from_slice(&0xFFFFu16.to_le_bytes()); // > 8224
    bad_stream.extend_from_slice(&[0u8; 16]);
    let path = temp_file("corrupt.xls", &wrap_in_cfb(&bad_stream));
    let err = rasp::open(&path).err().expect("open should fail");
    assert!(matches!(err, Error::Xls(_)), "{err}");
}
